pub mod files;
pub mod form;
pub mod pages;
pub mod status;

use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue};
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::{AppState, SESSION_COOKIE};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(form::show_form).post(form::save_form))
        .route("/generate", post(form::generate))
        .route("/reset", post(form::reset))
        .route("/download/{file}", get(files::download))
        .route("/images/{file}", get(files::image))
        .route("/characters", get(status::characters))
        .route("/characters/{id}", get(status::character_sheet))
        .route("/health", get(status::health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub fn session_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .find_map(|pair| {
            let (key, value) = pair.trim().split_once('=')?;
            (key == SESSION_COOKIE && !value.is_empty()).then(|| value.to_string())
        })
}

pub fn with_session_cookie(mut response: Response, session_id: &str) -> Response {
    let cookie = format!("{SESSION_COOKIE}={session_id}; Path=/; HttpOnly; SameSite=Lax");
    if let Ok(value) = HeaderValue::from_str(&cookie) {
        response.headers_mut().append(SET_COOKIE, value);
    }
    response
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    use axum::body::Body;
    use axum::http::header::{CONTENT_TYPE, LOCATION};
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use super::*;
    use crate::character::ExampleLibrary;
    use crate::config::PortraitEmbed;
    use crate::pipeline::testing::{StubCompletion, StubPortraits};
    use crate::pipeline::GenerationDeps;
    use crate::storage::StorageLayout;

    const AELAR_REPLY: &str = r#"{"name": "Aelar", "race": "Elf", "class": "Ranger",
        "description": "A stoic woodland scout.",
        "portrait_prompt": "An elf ranger in green leather armor"}"#;

    struct TestApp {
        _root: tempfile::TempDir,
        state: AppState,
        app: Router,
    }

    async fn test_app(reply: &str) -> TestApp {
        test_app_with_archive(reply, false).await
    }

    async fn test_app_with_archive(reply: &str, archive: bool) -> TestApp {
        let root = tempfile::tempdir().unwrap();
        let storage = StorageLayout::under(root.path());
        storage.ensure_directories().await.unwrap();
        let database = if archive {
            let url = format!("sqlite://{}?mode=rwc", root.path().join("archive.db").display());
            Some(crate::db::database::Database::init(&url).await.unwrap())
        } else {
            None
        };
        let portrait_path = storage.images_dir.join("Aelar_portrait_fixed.png");
        let deps = GenerationDeps {
            completion: Arc::new(StubCompletion::replying(reply)),
            portraits: Arc::new(StubPortraits::at(&portrait_path)),
            examples: ExampleLibrary::built_in(),
            storage,
            uploader: None,
            database,
            portrait_embed: PortraitEmbed::Path,
        };
        let state = AppState::new(deps, Duration::ZERO, 1);
        TestApp {
            _root: root,
            app: router(state.clone()),
            state,
        }
    }

    fn cookie_of(response: &Response) -> String {
        let header = response.headers()[SET_COOKIE].to_str().unwrap();
        let pair = header.split(';').next().unwrap();
        pair.split_once('=').unwrap().1.to_string()
    }

    async fn body_text(response: Response) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    async fn get_page(app: &Router, uri: &str, session: Option<&str>) -> Response {
        let mut request = Request::builder().uri(uri);
        if let Some(session) = session {
            request = request.header(COOKIE, format!("{SESSION_COOKIE}={session}"));
        }
        app.clone()
            .oneshot(request.body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    async fn post_form(app: &Router, uri: &str, session: &str, body: &str) -> Response {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header(COOKIE, format!("{SESSION_COOKIE}={session}"))
            .body(Body::from(body.to_string()))
            .unwrap();
        app.clone().oneshot(request).await.unwrap()
    }

    #[test]
    fn session_cookie_is_found_among_others() {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_static("theme=dark; forge_session=abc-123; other=1"),
        );
        assert_eq!(session_cookie(&headers).as_deref(), Some("abc-123"));
        assert_eq!(session_cookie(&HeaderMap::new()), None);
    }

    #[tokio::test]
    async fn first_visit_creates_a_session_and_renders_the_form() {
        let test = test_app(AELAR_REPLY).await;
        let response = get_page(&test.app, "/", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let session = cookie_of(&response);
        assert!(!session.is_empty());

        let page = body_text(response).await;
        assert!(page.contains("Character Name"));
        assert!(page.contains("Generate Character Sheet"));
        assert_eq!(test.state.session_count(), 1);
    }

    #[tokio::test]
    async fn cookieless_visits_do_not_grow_the_session_table() {
        let test = test_app(AELAR_REPLY).await;
        let state = test
            .state
            .clone()
            .with_session_limits(Duration::from_secs(3600), 10);
        let app = router(state.clone());

        let kept = cookie_of(&get_page(&app, "/", None).await);
        for _ in 0..50 {
            let response = get_page(&app, "/", None).await;
            assert_eq!(response.status(), StatusCode::OK);
            // revisit keeps the first session most recently seen
            get_page(&app, "/", Some(&kept)).await;
        }

        assert!(state.session_count() <= 10);
        let response = get_page(&app, "/", Some(&kept)).await;
        assert!(response.headers().get(SET_COOKIE).is_none() || cookie_of(&response) == kept);
    }

    #[tokio::test]
    async fn saved_edits_show_up_on_the_next_render() {
        let test = test_app(AELAR_REPLY).await;
        let session = cookie_of(&get_page(&test.app, "/", None).await);

        let response = post_form(&test.app, "/", &session, "name=Aelar&race=Elf").await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[LOCATION], "/");

        let page = body_text(get_page(&test.app, "/", Some(session.as_str())).await).await;
        assert!(page.contains("value=\"Aelar\""));
        assert!(page.contains("Changes saved."));
    }

    #[tokio::test]
    async fn unknown_fields_surface_as_a_banner() {
        let test = test_app(AELAR_REPLY).await;
        let session = cookie_of(&get_page(&test.app, "/", None).await);
        post_form(&test.app, "/", &session, "hit_points=12").await;

        let page = body_text(get_page(&test.app, "/", Some(session.as_str())).await).await;
        assert!(page.contains("banner error"));
        assert!(page.contains("Unknown field"));
    }

    #[tokio::test]
    async fn generate_fills_the_sheet_and_offers_downloads() {
        let test = test_app(AELAR_REPLY).await;
        let session = cookie_of(&get_page(&test.app, "/", None).await);

        let response = post_form(&test.app, "/generate", &session, "name=Aelar&race=Elf").await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);

        let page = body_text(get_page(&test.app, "/", Some(session.as_str())).await).await;
        assert!(page.contains("Character sheet for Aelar is ready."));
        assert!(page.contains("A stoic woodland scout."));
        assert!(page.contains("/images/Aelar_portrait_fixed.png"));

        let pdf_name = {
            let (_, session) = test.state.session(Some(session.as_str()));
            let session = session.lock();
            assert_eq!(session.record.class, "Ranger");
            let document = session.last_document.as_ref().unwrap();
            crate::storage::file_name_of(&document.pdf_path)
        };
        let download = get_page(&test.app, &format!("/download/{pdf_name}"), None).await;
        assert_eq!(download.status(), StatusCode::OK);
        assert_eq!(download.headers()[CONTENT_TYPE], "application/pdf");

        let image = get_page(&test.app, "/images/Aelar_portrait_fixed.png", None).await;
        assert_eq!(image.headers()[CONTENT_TYPE], "image/png");
    }

    #[tokio::test]
    async fn failed_generation_keeps_the_record_and_shows_the_error() {
        let test = test_app("no json here").await;
        let session = cookie_of(&get_page(&test.app, "/", None).await);
        post_form(&test.app, "/generate", &session, "name=Aelar").await;

        let page = body_text(get_page(&test.app, "/", Some(session.as_str())).await).await;
        assert!(page.contains("banner error"));
        assert!(page.contains("Data format error"));

        let (_, session) = test.state.session(Some(session.as_str()));
        let session = session.lock();
        assert_eq!(session.record.name, "Aelar");
        assert!(session.record.class.is_empty());
        assert!(session.last_document.is_none());
        assert!(!session.is_generating());
    }

    #[tokio::test]
    async fn concurrent_trigger_is_rejected_as_busy() {
        let test = test_app(AELAR_REPLY).await;
        let session_id = cookie_of(&get_page(&test.app, "/", None).await);
        {
            let (_, session) = test.state.session(Some(session_id.as_str()));
            session
                .lock()
                .begin_generation(Instant::now(), Duration::ZERO)
                .unwrap();
        }

        post_form(&test.app, "/generate", &session_id, "").await;
        let page = body_text(get_page(&test.app, "/", Some(session_id.as_str())).await).await;
        assert!(page.contains("already being generated"));
    }

    #[tokio::test]
    async fn reset_starts_a_fresh_record() {
        let test = test_app(AELAR_REPLY).await;
        let session = cookie_of(&get_page(&test.app, "/", None).await);
        post_form(&test.app, "/", &session, "name=Aelar").await;
        post_form(&test.app, "/reset", &session, "").await;

        let page = body_text(get_page(&test.app, "/", Some(session.as_str())).await).await;
        assert!(page.contains("Started a new character."));
        assert!(!page.contains("value=\"Aelar\""));
    }

    #[tokio::test]
    async fn traversal_downloads_are_not_found() {
        let test = test_app(AELAR_REPLY).await;
        let response = get_page(&test.app, "/download/..%2F..%2Fetc%2Fpasswd", None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn health_and_archive_report_a_disabled_archive() {
        let test = test_app(AELAR_REPLY).await;
        let response = get_page(&test.app, "/health", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["archive"], "disabled");

        let page = body_text(get_page(&test.app, "/characters", None).await).await;
        assert!(page.contains("archive is disabled"));
    }

    #[tokio::test]
    async fn archived_characters_are_listed_and_viewable() {
        let test = test_app_with_archive(AELAR_REPLY, true).await;
        let session = cookie_of(&get_page(&test.app, "/", None).await);
        post_form(&test.app, "/generate", &session, "name=Aelar&race=Elf").await;

        let listing = body_text(get_page(&test.app, "/characters", None).await).await;
        assert!(listing.contains("<a href=\"/characters/1\">Aelar</a>"));
        assert!(listing.contains("Ranger"));

        let sheet = get_page(&test.app, "/characters/1", None).await;
        assert_eq!(sheet.status(), StatusCode::OK);
        let sheet = body_text(sheet).await;
        assert!(sheet.contains("A stoic woodland scout."));
        assert_eq!(sheet.matches("Aelar_portrait_fixed.png").count(), 1);

        let missing = get_page(&test.app, "/characters/99", None).await;
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);

        let health = body_text(get_page(&test.app, "/health", None).await).await;
        assert!(health.contains("\"archive\":\"ok\""));
    }
}
