use reqwest::{Client, Response};
use serde::{Serialize, de::DeserializeOwned};

use crate::error::{ClientError, Result};

pub async fn get<T: DeserializeOwned>(client: &Client, url: &str) -> Result<T> {
    let response = client.get(url).send().await?;
    read_json(response).await
}

pub async fn post<T: DeserializeOwned, B: Serialize>(
    client: &Client,
    url: &str,
    body: &B,
) -> Result<T> {
    let response = client.post(url).json(body).send().await?;
    read_json(response).await
}

pub async fn post_empty<T: DeserializeOwned>(client: &Client, url: &str) -> Result<T> {
    let response = client.post(url).send().await?;
    read_json(response).await
}

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();

    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        return Err(rejection(status.as_u16(), &text));
    }

    Ok(response.json().await?)
}

/// Build an error from a failed response, using the relay's
/// `{"success": false, "error", "code"}` body when there is one
fn rejection(status: u16, body: &str) -> ClientError {
    let parsed: Option<serde_json::Value> = serde_json::from_str(body).ok();
    let field = |name: &str| {
        parsed
            .as_ref()
            .and_then(|v| v.get(name))
            .and_then(|v| v.as_str())
            .map(str::to_string)
    };

    ClientError::Rejected {
        status,
        code: field("code").unwrap_or_else(|| "http_error".to_string()),
        message: field("error").unwrap_or_else(|| body.trim().to_string()),
    }
}
