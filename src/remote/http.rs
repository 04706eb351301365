//! HTTP implementation of the remote gateway.
//!
//! Speaks a plain REST document-store dialect: collections are URL paths,
//! documents are JSON bodies, equality filters are query parameters.

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use url::Url;

use super::{Filter, RemoteError, RemoteErrorKind, RemoteGateway};

/// Response body of a document-creating POST.
#[derive(Debug, Deserialize)]
struct CreatedResponse {
  id: String,
}

/// Remote gateway over HTTP.
pub struct HttpRemoteGateway {
  http: reqwest::Client,
  base_url: Url,
  api_token: Option<String>,
}

impl HttpRemoteGateway {
  pub fn new(base_url: &str, api_token: Option<String>) -> Result<Self> {
    // A trailing slash keeps Url::join from eating the last path segment.
    let normalized = if base_url.ends_with('/') {
      base_url.to_string()
    } else {
      format!("{}/", base_url)
    };

    let base_url =
      Url::parse(&normalized).map_err(|e| eyre!("Invalid remote URL {}: {}", base_url, e))?;

    let http = reqwest::Client::builder()
      .timeout(Duration::from_secs(10))
      .build()
      .map_err(|e| eyre!("Failed to build HTTP client: {}", e))?;

    Ok(Self {
      http,
      base_url,
      api_token,
    })
  }

  fn url_for(&self, path: &str) -> Result<Url, RemoteError> {
    self
      .base_url
      .join(path)
      .map_err(|e| RemoteError::new(RemoteErrorKind::Rejected, format!("bad path {}: {}", path, e)))
  }

  fn request(&self, method: reqwest::Method, url: Url) -> reqwest::RequestBuilder {
    let builder = self.http.request(method, url);
    match &self.api_token {
      Some(token) => builder.bearer_auth(token),
      None => builder,
    }
  }

  fn map_error(e: reqwest::Error) -> RemoteError {
    if e.is_timeout() {
      RemoteError::new(RemoteErrorKind::Timeout, e.to_string())
    } else if e.is_decode() {
      RemoteError::new(RemoteErrorKind::Decode, e.to_string())
    } else {
      RemoteError::network(e.to_string())
    }
  }

  fn map_status(status: StatusCode, context: &str) -> RemoteError {
    if status == StatusCode::NOT_FOUND {
      RemoteError::not_found(context.to_string())
    } else if status.is_server_error() {
      RemoteError::new(RemoteErrorKind::Server, format!("{}: {}", context, status))
    } else {
      RemoteError::new(RemoteErrorKind::Rejected, format!("{}: {}", context, status))
    }
  }
}

#[async_trait]
impl RemoteGateway for HttpRemoteGateway {
  async fn get_document(&self, collection: &str, id: &str) -> Result<Option<Value>, RemoteError> {
    let url = self.url_for(&format!("{}/{}", collection, id))?;

    let response = self
      .request(reqwest::Method::GET, url)
      .send()
      .await
      .map_err(Self::map_error)?;

    if response.status() == StatusCode::NOT_FOUND {
      return Ok(None);
    }
    if !response.status().is_success() {
      return Err(Self::map_status(response.status(), collection));
    }

    let doc = response.json::<Value>().await.map_err(Self::map_error)?;
    Ok(Some(doc))
  }

  async fn get_collection(
    &self,
    collection: &str,
    filters: &[Filter],
  ) -> Result<Vec<Value>, RemoteError> {
    let mut url = self.url_for(collection)?;

    {
      let mut query = url.query_pairs_mut();
      for filter in filters {
        let value = match &filter.value {
          Value::String(s) => s.clone(),
          other => other.to_string(),
        };
        query.append_pair(&filter.field, &value);
      }
    }

    let response = self
      .request(reqwest::Method::GET, url)
      .send()
      .await
      .map_err(Self::map_error)?;

    if response.status() == StatusCode::NOT_FOUND {
      // An absent collection is an empty one.
      return Ok(Vec::new());
    }
    if !response.status().is_success() {
      return Err(Self::map_status(response.status(), collection));
    }

    let docs = response.json::<Vec<Value>>().await.map_err(Self::map_error)?;
    Ok(docs)
  }

  async fn set_document(
    &self,
    collection: &str,
    id: &str,
    data: &Value,
  ) -> Result<(), RemoteError> {
    let url = self.url_for(&format!("{}/{}", collection, id))?;

    let response = self
      .request(reqwest::Method::PUT, url)
      .json(data)
      .send()
      .await
      .map_err(Self::map_error)?;

    if !response.status().is_success() {
      return Err(Self::map_status(response.status(), collection));
    }
    Ok(())
  }

  async fn update_document(
    &self,
    collection: &str,
    id: &str,
    patch: &Value,
  ) -> Result<(), RemoteError> {
    let url = self.url_for(&format!("{}/{}", collection, id))?;

    let response = self
      .request(reqwest::Method::PATCH, url)
      .json(patch)
      .send()
      .await
      .map_err(Self::map_error)?;

    if !response.status().is_success() {
      return Err(Self::map_status(response.status(), collection));
    }
    Ok(())
  }

  async fn delete_document(&self, collection: &str, id: &str) -> Result<(), RemoteError> {
    let url = self.url_for(&format!("{}/{}", collection, id))?;

    let response = self
      .request(reqwest::Method::DELETE, url)
      .send()
      .await
      .map_err(Self::map_error)?;

    if !response.status().is_success() {
      return Err(Self::map_status(response.status(), collection));
    }
    Ok(())
  }

  async fn add_document(&self, collection: &str, data: &Value) -> Result<String, RemoteError> {
    let url = self.url_for(collection)?;

    let response = self
      .request(reqwest::Method::POST, url)
      .json(data)
      .send()
      .await
      .map_err(Self::map_error)?;

    if !response.status().is_success() {
      return Err(Self::map_status(response.status(), collection));
    }

    let created = response
      .json::<CreatedResponse>()
      .await
      .map_err(Self::map_error)?;
    Ok(created.id)
  }

  async fn probe(&self) -> bool {
    // Any response at all means the host is reachable; only transport
    // failures count as unreachable.
    self
      .request(reqwest::Method::HEAD, self.base_url.clone())
      .timeout(Duration::from_secs(2))
      .send()
      .await
      .is_ok()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_base_url_gets_trailing_slash() {
    let gateway = HttpRemoteGateway::new("https://api.example.com/v1", None).unwrap();
    assert_eq!(gateway.base_url.as_str(), "https://api.example.com/v1/");

    let url = gateway.url_for("users/u1/workouts/w1").unwrap();
    assert_eq!(
      url.as_str(),
      "https://api.example.com/v1/users/u1/workouts/w1"
    );
  }

  #[test]
  fn test_invalid_url_is_rejected() {
    assert!(HttpRemoteGateway::new("not a url", None).is_err());
  }

  #[test]
  fn test_status_mapping() {
    let err = HttpRemoteGateway::map_status(StatusCode::NOT_FOUND, "users");
    assert_eq!(err.kind, RemoteErrorKind::NotFound);

    let err = HttpRemoteGateway::map_status(StatusCode::INTERNAL_SERVER_ERROR, "users");
    assert_eq!(err.kind, RemoteErrorKind::Server);
    assert!(err.is_transient());

    let err = HttpRemoteGateway::map_status(StatusCode::FORBIDDEN, "users");
    assert_eq!(err.kind, RemoteErrorKind::Rejected);
    assert!(!err.is_transient());
  }
}
