use actix_multipart::Multipart;
use actix_web::{HttpResponse, web};
use futures::{StreamExt, TryStreamExt};
use image::RgbImage;
use log::{error, info, warn};
use shared::EmotionResult;
use uuid::Uuid;

use crate::config::LimitsConfig;
use crate::decode::decode_upload;
use crate::error::ApiError;
use crate::model::ModelAdapter;
use crate::response::{majority_response, weighted_response};
use crate::state::Models;
use crate::ws;

/// Multipart field names of the three screenshots, in processing order.
pub const SLOTS: [&str; 3] = ["screenshot1", "screenshot2", "screenshot3"];

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/ws/emotions/").route(web::get().to(ws::emotion_socket)))
        .service(
            web::resource("/api/analyze/")
                .route(web::post().to(analyze_majority))
                .default_service(web::route().to(method_not_allowed)),
        )
        .service(
            web::resource("/api/analyze/weighted/")
                .route(web::post().to(analyze_weighted))
                .default_service(web::route().to(method_not_allowed)),
        );
}

async fn analyze_majority(
    models: web::Data<Models>,
    limits: web::Data<LimitsConfig>,
    payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    let request_id = Uuid::new_v4();
    let results = classify_batch(request_id, &models.majority, &limits, payload).await?;
    let response = majority_response(&results)
        .ok_or_else(|| ApiError::InvalidRequest("aucune prédiction".into()))?;
    info!(
        "[{}] majority {} from {:?}",
        request_id, response.majority_emotion, response.predictions
    );
    Ok(HttpResponse::Ok().json(response))
}

async fn analyze_weighted(
    models: web::Data<Models>,
    limits: web::Data<LimitsConfig>,
    payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    let request_id = Uuid::new_v4();
    let results = classify_batch(request_id, &models.weighted, &limits, payload).await?;
    let response = weighted_response(results);
    info!(
        "[{}] global top {:?}",
        request_id,
        response
            .global_top_emotions
            .iter()
            .map(|s| s.emotion)
            .collect::<Vec<_>>()
    );
    Ok(HttpResponse::Ok().json(response))
}

async fn method_not_allowed() -> Result<HttpResponse, ApiError> {
    Err(ApiError::MethodNotAllowed)
}

/// Decodes all three slots, then classifies them one after another. Stops at the first failure.
async fn classify_batch(
    request_id: Uuid,
    adapter: &ModelAdapter,
    limits: &LimitsConfig,
    payload: Multipart,
) -> Result<Vec<EmotionResult>, ApiError> {
    let uploads = read_fields(payload, limits.max_upload_bytes).await.inspect_err(|e| {
        warn!("[{}] unreadable upload: {}", request_id, e);
    })?;
    let images = decode_slots(&uploads).inspect_err(|e| {
        warn!("[{}] rejected batch: {}", request_id, e);
    })?;

    let mut results = Vec::with_capacity(SLOTS.len());
    for (slot, image) in SLOTS.into_iter().zip(&images) {
        let result = adapter.classify(image).await.map_err(|source| {
            error!(
                "[{}] {} backend failed on {}: {}",
                request_id,
                adapter.backend_name(),
                slot,
                source
            );
            ApiError::Classification { slot, source }
        })?;
        results.push(result);
    }
    Ok(results)
}

fn decode_slots(uploads: &[(&'static str, Vec<u8>)]) -> Result<Vec<RgbImage>, ApiError> {
    let mut images = Vec::with_capacity(SLOTS.len());
    for slot in SLOTS {
        // Repeated field names resolve to the last occurrence.
        let (_, data) = uploads
            .iter()
            .rev()
            .find(|(name, _)| *name == slot)
            .ok_or(ApiError::MissingFile { slot })?;
        let image = decode_upload(data).map_err(|source| ApiError::InvalidUpload { slot, source })?;
        images.push(image);
    }
    Ok(images)
}

/// Buffers the screenshot fields, each up to `limit` bytes. Other fields are drained and dropped.
async fn read_fields(
    mut payload: Multipart,
    limit: usize,
) -> Result<Vec<(&'static str, Vec<u8>)>, ApiError> {
    let mut fields = Vec::new();
    while let Some(mut field) = payload
        .try_next()
        .await
        .map_err(|e| ApiError::InvalidRequest(e.to_string()))?
    {
        let slot = field
            .name()
            .and_then(|name| SLOTS.into_iter().find(|slot| *slot == name));
        let mut data = Vec::new();
        while let Some(chunk) = field.next().await {
            let chunk = chunk.map_err(|e| ApiError::InvalidRequest(e.to_string()))?;
            let Some(slot) = slot else { continue };
            if data.len() + chunk.len() > limit {
                return Err(ApiError::UploadTooLarge { slot, limit });
            }
            data.extend_from_slice(&chunk);
        }
        if let Some(slot) = slot {
            fields.push((slot, data));
        }
    }
    Ok(fields)
}
