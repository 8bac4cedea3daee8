use crate::{
    auth::{AuthUser, PageUser},
    backend::Services,
    config::Config,
    drive::{Drive, DriveView, ProgressBoard, SelectedFile},
    errors::ApiError,
};
use actix_multipart::Multipart;
use actix_web::{HttpResponse, web};
use bytes::BytesMut;
use futures_util::TryStreamExt as _;
use serde::{Deserialize, Serialize};

#[derive(Deserialize)]
pub struct DeleteFileReq {
    pub name: String,
}

#[derive(Serialize)]
pub struct ProgressResp {
    pub progress: u8,
}

fn drive_for<'a>(cfg: &Config, services: &'a Services, user: &'a AuthUser) -> Drive<'a> {
    Drive {
        store: services.storage.as_ref(),
        token: Some(user.access_token.as_str()),
        cache_control: cfg.cache_control_header(),
    }
}

pub async fn drive_page(
    cfg: web::Data<Config>,
    services: web::Data<Services>,
    PageUser(user): PageUser,
) -> HttpResponse {
    let drive = drive_for(&cfg, &services, &user);
    let mut view = DriveView::default();
    view.refresh(&drive).await;
    HttpResponse::Ok().json(view)
}

pub async fn upload_file(
    cfg: web::Data<Config>,
    services: web::Data<Services>,
    board: web::Data<ProgressBoard>,
    user: AuthUser,
    mut payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    let mut selected: Option<SelectedFile> = None;
    while let Some(field) = payload
        .try_next()
        .await
        .map_err(|_| ApiError::BadRequest("invalid multipart".into()))?
    {
        let filename = field
            .content_disposition()
            .and_then(|cd| cd.get_filename().map(|s| s.to_string()));
        // browsers send an empty filename when nothing was picked
        let Some(name) = filename.filter(|n| !n.is_empty()) else {
            continue;
        };
        selected = Some(read_field(&cfg, name, field).await?);
        break;
    }
    let selected = selected.ok_or(ApiError::BadRequest("no file part".into()))?;

    let drive = drive_for(&cfg, &services, &user);
    let mut view = DriveView::default();
    view.refresh(&drive).await;
    view.upload(&drive, selected, &board.into_inner(), &user.user_id).await;
    Ok(HttpResponse::Ok().json(view))
}

async fn read_field(
    cfg: &Config,
    name: String,
    mut field: actix_multipart::Field,
) -> Result<SelectedFile, ApiError> {
    let mut data = BytesMut::new();
    while let Some(chunk) = field
        .try_next()
        .await
        .map_err(|_| ApiError::BadRequest("upload read error".into()))?
    {
        data.extend_from_slice(&chunk);
        if data.len() > cfg.max_upload_size {
            return Err(ApiError::BadRequest("file too large".into()));
        }
    }
    Ok(SelectedFile { name, data: data.freeze() })
}

pub async fn delete_file(
    cfg: web::Data<Config>,
    services: web::Data<Services>,
    user: AuthUser,
    body: web::Json<DeleteFileReq>,
) -> HttpResponse {
    let drive = drive_for(&cfg, &services, &user);
    let mut view = DriveView::default();
    view.refresh(&drive).await;
    view.delete(&drive, &body.name).await;
    HttpResponse::Ok().json(view)
}

pub async fn upload_progress(board: web::Data<ProgressBoard>, user: AuthUser) -> HttpResponse {
    HttpResponse::Ok().json(ProgressResp { progress: board.get(&user.user_id) })
}

#[cfg(test)]
mod tests {
    use crate::backend::{self, BackendError, MemoryBackend, ObjectStore, UploadOptions};
    use crate::models::file::StoredObject;
    use crate::sanitize::is_sanitized;
    use crate::test_app;
    use actix_web::{cookie::Cookie, http::StatusCode, test};
    use async_trait::async_trait;
    use bytes::Bytes;
    use serde_json::{json, Value};
    use std::sync::Arc;

    /// Bucket that lists and deletes normally but refuses every upload.
    struct ReadOnlyBucket(Arc<MemoryBackend>);

    #[async_trait]
    impl ObjectStore for ReadOnlyBucket {
        async fn list(&self, token: Option<&str>) -> backend::Result<Vec<StoredObject>> {
            ObjectStore::list(self.0.as_ref(), token).await
        }
        async fn upload(&self, _: Option<&str>, _: &str, _: Bytes, _: UploadOptions) -> backend::Result<()> {
            Err(BackendError::Api { status: 413, message: "Payload too large".into() })
        }
        async fn remove(&self, token: Option<&str>, keys: &[String]) -> backend::Result<()> {
            self.0.remove(token, keys).await
        }
        fn public_url(&self, key: &str) -> String {
            self.0.public_url(key)
        }
    }

    const BOUNDARY: &str = "XyZtododriveBoundary";

    fn multipart_body(parts: &[(&str, Option<&str>, &[u8])]) -> Vec<u8> {
        let mut body = Vec::new();
        for (field, filename, data) in parts {
            body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
            match filename {
                Some(f) => body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{field}\"; filename=\"{f}\"\r\n\
                         Content-Type: application/octet-stream\r\n\r\n"
                    )
                    .as_bytes(),
                ),
                None => body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{field}\"\r\n\r\n").as_bytes(),
                ),
            }
            body.extend_from_slice(data);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn with_cookies(mut req: test::TestRequest, cookies: &[Cookie<'static>]) -> test::TestRequest {
        for c in cookies {
            req = req.cookie(c.clone());
        }
        req
    }

    fn upload_request(cookies: &[Cookie<'static>], body: Vec<u8>) -> test::TestRequest {
        with_cookies(test::TestRequest::post().uri("/api/drive/upload"), cookies)
            .insert_header((
                "content-type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            ))
            .set_payload(body)
    }

    #[actix_web::test]
    async fn upload_lists_sanitized_file() {
        let (app, _) = test_app!();
        let cookies = crate::sign_up!(&app, "drive@example.org");
        let content = vec![42u8; 2048];
        let body = multipart_body(&[
            ("note", None, b"ignored".as_slice()),
            ("file", Some("My Resume (final) v2.pdf"), content.as_slice()),
            ("file", Some("second.txt"), b"not taken".as_slice()),
        ]);

        let view: Value =
            test::call_and_read_body_json(&app, upload_request(&cookies, body).to_request()).await;
        let files = view["files"].as_array().unwrap();
        assert_eq!(files.len(), 1);
        let name = files[0]["name"].as_str().unwrap();
        assert!(is_sanitized(name));
        assert_eq!(files[0]["size"], 2048);
        assert_eq!(files[0]["size_label"], "2 KB");
        assert!(view["error"].is_null());

        let req = with_cookies(test::TestRequest::get().uri("/drive"), &cookies).to_request();
        let page: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(page["files"].as_array().unwrap().len(), 1);

        let req = with_cookies(test::TestRequest::get().uri("/api/drive/progress"), &cookies)
            .to_request();
        let progress: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(progress, json!({ "progress": 0 }));
    }

    #[actix_web::test]
    async fn upload_without_file_part_is_rejected() {
        let (app, _) = test_app!();
        let cookies = crate::sign_up!(&app, "nofile@example.org");
        let body = multipart_body(&[("note", None, b"just text".as_slice())]);
        let resp = test::call_service(&app, upload_request(&cookies, body).to_request()).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn empty_file_input_is_no_file() {
        let (app, backend) = test_app!();
        let cookies = crate::sign_up!(&app, "blank@example.org");
        let body = multipart_body(&[("file", Some(""), b"".as_slice())]);
        let resp = test::call_service(&app, upload_request(&cookies, body).to_request()).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert!(ObjectStore::list(backend.as_ref(), None).await.unwrap().is_empty());
    }

    #[actix_web::test]
    async fn failed_upload_keeps_listing() {
        let (app, backend) = test_app!(storage = |b: Arc<MemoryBackend>| -> Arc<dyn ObjectStore> {
            Arc::new(ReadOnlyBucket(b))
        });
        let existing = UploadOptions { upsert: true, ..UploadOptions::default() };
        backend
            .upload(None, "kept.txt", Bytes::from_static(b"kept"), existing)
            .await
            .unwrap();
        let cookies = crate::sign_up!(&app, "ro@example.org");

        let body = multipart_body(&[("file", Some("new.txt"), b"new".as_slice())]);
        let view: Value =
            test::call_and_read_body_json(&app, upload_request(&cookies, body).to_request()).await;
        let files = view["files"].as_array().unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0]["name"], "kept.txt");
        assert_eq!(view["error"], "File upload failed: Payload too large");
    }

    #[actix_web::test]
    async fn drive_api_requires_session() {
        let (app, _) = test_app!();
        let body = multipart_body(&[("file", Some("a.txt"), b"a".as_slice())]);
        let resp = test::call_service(&app, upload_request(&[], body).to_request()).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let resp = test::call_service(&app, test::TestRequest::get().uri("/drive").to_request()).await;
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    }

    #[actix_web::test]
    async fn delete_missing_name_keeps_listing() {
        let (app, _) = test_app!();
        let cookies = crate::sign_up!(&app, "del@example.org");
        let body = multipart_body(&[("file", Some("keep me.txt"), b"data".as_slice())]);
        test::call_service(&app, upload_request(&cookies, body).to_request()).await;

        let req = with_cookies(test::TestRequest::post().uri("/api/drive/delete"), &cookies)
            .set_json(json!({ "name": "nothing-here.txt" }))
            .to_request();
        let view: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(view["files"].as_array().unwrap().len(), 1);

        let req = with_cookies(test::TestRequest::post().uri("/api/drive/delete"), &cookies)
            .set_json(json!({ "name": "keep-me.txt" }))
            .to_request();
        let view: Value = test::call_and_read_body_json(&app, req).await;
        assert!(view["files"].as_array().unwrap().is_empty());
    }
}
