pub mod auth;
pub mod drive;
pub mod health;
pub mod todos;

use actix_web::web;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(auth::index))
        .route("/login", web::get().to(auth::login_page))
        .route("/todos", web::get().to(todos::todos_page))
        .route("/drive", web::get().to(drive::drive_page))
        .route("/health", web::get().to(health::health_check))
        .service(
            web::scope("/api")
                .service(
                    web::scope("/auth")
                        .route("/login", web::post().to(auth::login))
                        .route("/signup", web::post().to(auth::signup))
                        .route("/logout", web::post().to(auth::logout)),
                )
                .route("/add-todo", web::post().to(todos::add_todo))
                .route("/delete-todo", web::post().to(todos::delete_todo))
                .route("/toggle-todo", web::post().to(todos::toggle_todo))
                .service(
                    web::scope("/drive")
                        .route("/upload", web::post().to(drive::upload_file))
                        .route("/delete", web::post().to(drive::delete_file))
                        .route("/progress", web::get().to(drive::upload_progress)),
                ),
        );
}

/// Builds the full app over a fresh [`MemoryBackend`](crate::backend::MemoryBackend)
/// and hands back the backend for direct inspection. `storage = f` swaps the
/// bucket for `f(backend)`.
#[cfg(test)]
#[macro_export]
macro_rules! test_app {
    () => {
        $crate::test_app!(storage = |backend: std::sync::Arc<$crate::backend::MemoryBackend>|
            -> std::sync::Arc<dyn $crate::backend::ObjectStore> { backend })
    };
    (storage = $storage:expr) => {{
        let mut cfg = $crate::config::Config::default();
        cfg.backend = $crate::config::BackendKind::Memory;
        cfg.jwt_secret = Some("test-secret".to_string());
        let backend = std::sync::Arc::new($crate::backend::MemoryBackend::new(
            "test-secret",
            cfg.bucket.clone(),
        ));
        let mut services = $crate::backend::Services::from_shared(backend.clone());
        services.storage = ($storage)(backend.clone());
        let app = actix_web::test::init_service(
            actix_web::App::new()
                .wrap(actix_web::middleware::from_fn($crate::auth::load_session))
                .app_data(actix_web::web::Data::new(cfg))
                .app_data(actix_web::web::Data::new(services))
                .app_data(actix_web::web::Data::new($crate::drive::ProgressBoard::default()))
                .configure($crate::routes::configure),
        )
        .await;
        (app, backend)
    }};
}

/// Signs up `email` with a fixed password and returns the session cookies.
#[cfg(test)]
#[macro_export]
macro_rules! sign_up {
    ($app:expr, $email:expr) => {{
        let req = actix_web::test::TestRequest::post()
            .uri("/api/auth/signup")
            .set_json(serde_json::json!({ "email": $email, "password": "correct horse" }))
            .to_request();
        let resp = actix_web::test::call_service($app, req).await;
        assert!(resp.status().is_success(), "sign up failed: {}", resp.status());
        let cookies: Vec<actix_web::cookie::Cookie<'static>> =
            resp.response().cookies().map(|c| c.into_owned()).collect();
        cookies
    }};
}
