use crate::types::error::StorageError;
use reqwest::multipart::{Form, Part};
use std::collections::BTreeMap;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Upload `data` as a browser-style multipart form POST.
///
/// The storage service answers a successful POST with an empty body, so
/// any body returned here is an error document and is surfaced verbatim.
pub(crate) async fn post_form<R>(
    client: &reqwest::Client,
    url: &str,
    fields: BTreeMap<String, String>,
    mut data: R,
    file_name: &str,
) -> Result<(), StorageError>
where
    R: AsyncRead + Unpin,
{
    tracing::debug!("Posting data to {} (fields {:?})", url, fields.keys());

    let mut content = Vec::new();
    data.read_to_end(&mut content).await?;

    let mut form = Form::new();
    for (name, value) in fields {
        form = form.text(name, value);
    }
    // The file must be the last field of the form
    form = form.part("file", Part::bytes(content).file_name(file_name.to_string()));

    let response = client
        .post(url)
        .multipart(form)
        .send()
        .await
        .map_err(|err| {
            tracing::error!("Error saving data to S3 err={}", err);
            StorageError::Transport(err)
        })?;

    let status = response.status();
    let body = response.text().await?;

    if !body.is_empty() {
        tracing::error!("Got response from S3 status={} err={}", status, body);
        return Err(StorageError::UploadRejected(body));
    }
    if !status.is_success() {
        tracing::error!("S3 rejected upload with status={}", status);
        return Err(StorageError::UploadRejected(format!(
            "upload failed with HTTP status {}",
            status
        )));
    }

    Ok(())
}
