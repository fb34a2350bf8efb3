use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use shared::ErrorResponse;

use crate::decode::DecodeError;
use crate::model::ClassificationError;

/// Everything a batch request can fail with. Rendered as `{"error": ...}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Le fichier '{slot}' est manquant.")]
    MissingFile { slot: &'static str },
    #[error("Erreur lors du traitement de '{slot}' : {source}")]
    InvalidUpload {
        slot: &'static str,
        source: DecodeError,
    },
    #[error("Erreur lors de l'analyse de '{slot}' : {source}")]
    Classification {
        slot: &'static str,
        source: ClassificationError,
    },
    #[error("Le fichier '{slot}' dépasse la taille maximale de {limit} octets.")]
    UploadTooLarge { slot: &'static str, limit: usize },
    #[error("Requête invalide : {0}")]
    InvalidRequest(String),
    #[error("Seule la méthode POST est autorisée.")]
    MethodNotAllowed,
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::MissingFile { .. }
            | ApiError::InvalidUpload { .. }
            | ApiError::UploadTooLarge { .. }
            | ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::Classification { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorResponse {
            error: self.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_and_statuses() {
        let missing = ApiError::MissingFile { slot: "screenshot2" };
        assert_eq!(missing.to_string(), "Le fichier 'screenshot2' est manquant.");
        assert_eq!(missing.status_code(), StatusCode::BAD_REQUEST);

        let failed = ApiError::Classification {
            slot: "screenshot1",
            source: ClassificationError::Backend("CUDA out of memory".into()),
        };
        assert_eq!(
            failed.to_string(),
            "Erreur lors de l'analyse de 'screenshot1' : CUDA out of memory"
        );
        assert_eq!(failed.status_code(), StatusCode::INTERNAL_SERVER_ERROR);

        let too_large = ApiError::UploadTooLarge {
            slot: "screenshot3",
            limit: 1024,
        };
        assert_eq!(
            too_large.to_string(),
            "Le fichier 'screenshot3' dépasse la taille maximale de 1024 octets."
        );
        assert_eq!(too_large.status_code(), StatusCode::BAD_REQUEST);

        assert_eq!(
            ApiError::MethodNotAllowed.status_code(),
            StatusCode::METHOD_NOT_ALLOWED
        );
    }
}
