//! Extractors whose rejections use the crate's JSON error body.
//!
//! Axum's own extractors answer malformed input with plain text; these wrap
//! them and turn every rejection into a 400 [`ShopError::Validation`].

use axum::extract::{FromRequest, FromRequestParts, Multipart, Path, Query, Request};
use axum::http::request::Parts;
use axum::{async_trait, Json};
use serde::de::DeserializeOwned;
use validator::Validate;

use crate::error::ShopError;

/// Like [`Json`], but malformed bodies and failed validation both become a 400 [`ShopError::Validation`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidatedJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = ShopError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await.map_err(|e| ShopError::validation(e.body_text()))?;
        value.validate().map_err(|e| ShopError::validation(e.to_string()))?;
        Ok(Self(value))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ApiPath<T>(pub T);

#[async_trait]
impl<T, S> FromRequestParts<S> for ApiPath<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = ShopError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(value) = Path::<T>::from_request_parts(parts, state).await.map_err(|e| ShopError::validation(e.body_text()))?;
        Ok(Self(value))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ApiQuery<T>(pub T);

#[async_trait]
impl<T, S> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ShopError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state).await.map_err(|e| ShopError::validation(e.body_text()))?;
        Ok(Self(value))
    }
}

/// One uploaded file taken from a multipart body.
#[derive(Debug)]
pub struct FileUpload {
    pub file_name: Option<String>,
    pub bytes: Vec<u8>,
}

impl FileUpload {
    /// Read the first part named `field`, rejecting bodies over `max_bytes`.
    pub async fn read(mut multipart: Multipart, field: &str, max_bytes: usize) -> Result<Self, ShopError> {
        while let Some(part) = multipart.next_field().await.map_err(|e| ShopError::validation(e.body_text()))? {
            if part.name() != Some(field) {
                continue;
            }
            let file_name = part.file_name().map(str::to_string);
            let bytes = part.bytes().await.map_err(|e| ShopError::validation(e.body_text()))?;
            if bytes.len() > max_bytes {
                return Err(ShopError::validation(format!("file too large: {} bytes (max {max_bytes})", bytes.len())));
            }
            return Ok(Self { file_name, bytes: bytes.to_vec() });
        }
        Err(ShopError::validation(format!("a file is required in field '{field}'")))
    }
}

/// [`Multipart`] with a JSON rejection for missing or malformed multipart bodies.
pub struct ApiMultipart(pub Multipart);

#[async_trait]
impl<S> FromRequest<S> for ApiMultipart
where
    S: Send + Sync,
{
    type Rejection = ShopError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        Multipart::from_request(req, state).await.map(Self).map_err(|e| ShopError::validation(e.body_text()))
    }
}
