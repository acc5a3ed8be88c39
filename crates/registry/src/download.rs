use crate::error::{RegistryError, Result};

/// Fetches the raw bytes at `url`. The client carries a strict per-request
/// timeout, so a stalled registry cannot wedge a relay worker for long.
pub(crate) async fn download(client: &reqwest::Client, url: &str) -> Result<Vec<u8>> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|source| RegistryError::Download {
            url: url.to_string(),
            source,
        })?;

    let status = response.status();
    if !status.is_success() {
        return Err(RegistryError::HttpStatus {
            status: status.as_u16(),
            url: url.to_string(),
        });
    }

    let body = response
        .bytes()
        .await
        .map_err(|source| RegistryError::Download {
            url: url.to_string(),
            source,
        })?;

    Ok(body.to_vec())
}
