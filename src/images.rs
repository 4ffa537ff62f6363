use reqwest::multipart::{Form, Part};

use crate::{AppError, AppResult, GetField};

/// Client for the external image host. Bytes go out, a hosted URL comes back.
pub struct ImageHost {
    http: reqwest::Client,
    url: String,
    key: String,
}

impl ImageHost {
    pub fn new(url: String, key: String) -> ImageHost {
        ImageHost {
            http: reqwest::Client::new(),
            url,
            key,
        }
    }

    pub async fn upload(&self, image: Vec<u8>) -> AppResult<String> {
        let form = Form::new()
            .text("key", self.key.clone())
            .part("image", Part::bytes(image).file_name("image"));

        let response = self
            .http
            .post(&self.url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| AppError::Upload(format!("image host unreachable: {e}")))?;

        if !response.status().is_success() {
            return Err(AppError::Upload(format!(
                "image host answered {}",
                response.status()
            )));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AppError::Upload(format!("image host sent garbage: {e}")))?;
        body.get_obj_field("data")?.get_str_field("url")
    }
}
