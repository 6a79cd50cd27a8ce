use std::collections::HashMap;
use std::time::Instant;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::{Html, IntoResponse, Redirect, Response};
use tracing::{error, info, warn};

use crate::character::age::normalize_age;
use crate::character::options::{options_for, CUSTOM_OPTION};
use crate::character::{field_spec, FieldInput, FieldKind};
use crate::error::{ForgeError, ForgeResult};
use crate::handlers::pages::{form_page, CUSTOM_SUFFIX};
use crate::handlers::{session_cookie, with_session_cookie};
use crate::pipeline::{clamp_portrait_count, generate_character};
use crate::state::{AppState, GeneratedDocument, GenerationGuard, Session, StatusMessage};
use crate::utils::timing::start_action_timer;

const PORTRAIT_COUNT_KEY: &str = "portrait_count";

pub fn parse_form(body: &[u8]) -> ForgeResult<Vec<(String, String)>> {
    serde_urlencoded::from_bytes(body)
        .map_err(|err| ForgeError::Validation(format!("unreadable form submission: {err}")))
}

fn text_value(name: &str, value: &str, customs: &HashMap<&str, &str>) -> String {
    if value == CUSTOM_OPTION && options_for(name).is_some() {
        return customs.get(name).copied().unwrap_or_default().to_string();
    }
    if name == "age" {
        if let Some(age) = normalize_age(value) {
            return age.to_string();
        }
    }
    value.to_string()
}

/// Applies a form submission to the session. All-or-nothing: a bad key leaves the record as it was.
pub fn apply_form(session: &mut Session, pairs: &[(String, String)]) -> ForgeResult<()> {
    if session.is_generating() {
        return Err(ForgeError::Busy);
    }

    let customs: HashMap<&str, &str> = pairs
        .iter()
        .filter_map(|(key, value)| {
            key.strip_suffix(CUSTOM_SUFFIX)
                .map(|base| (base, value.trim()))
        })
        .collect();

    let mut record = session.record.clone();
    let mut portrait_count = session.portrait_count;
    let mut lists: Vec<(&str, Vec<String>)> = Vec::new();

    for (key, value) in pairs {
        if key == PORTRAIT_COUNT_KEY {
            let count = value.trim().parse::<usize>().map_err(|_| {
                ForgeError::Validation(format!("'{value}' is not a valid number of portraits"))
            })?;
            portrait_count = clamp_portrait_count(count);
            continue;
        }
        if key.ends_with(CUSTOM_SUFFIX) {
            continue;
        }
        match field_spec(key) {
            Some(spec) if spec.kind == FieldKind::List => {
                match lists.iter_mut().find(|(name, _)| *name == spec.name) {
                    Some((_, items)) => items.push(value.clone()),
                    None => lists.push((spec.name, vec![value.clone()])),
                }
            }
            _ => record.set_field(key, FieldInput::Text(text_value(key, value, &customs)))?,
        }
    }
    for (name, items) in lists {
        record.set_field(name, FieldInput::List(items))?;
    }

    session.record = record;
    session.portrait_count = portrait_count;
    Ok(())
}

fn redirect_home(session_id: &str) -> Response {
    with_session_cookie(Redirect::to("/").into_response(), session_id)
}

pub async fn show_form(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let (session_id, session) = state.session(session_cookie(&headers).as_deref());
    let page = {
        let mut session = session.lock();
        let message = session.message.take();
        form_page(&session, message.as_ref())
    };
    with_session_cookie(Html(page).into_response(), &session_id)
}

pub async fn save_form(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let (session_id, session) = state.session(session_cookie(&headers).as_deref());
    let mut session = session.lock();
    let result = parse_form(&body).and_then(|pairs| apply_form(&mut session, &pairs));
    session.message = Some(match result {
        Ok(()) => StatusMessage::info("Changes saved."),
        Err(err) => {
            warn!("Rejected form edit for session {}: {}", session_id, err);
            StatusMessage::error(err.to_string())
        }
    });
    drop(session);
    redirect_home(&session_id)
}

pub async fn generate(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let (session_id, session) = state.session(session_cookie(&headers).as_deref());

    let claim = {
        let mut guard = session.lock();
        let claimed = parse_form(&body)
            .and_then(|pairs| apply_form(&mut guard, &pairs))
            .and_then(|()| guard.begin_generation(Instant::now(), state.rate_limit));
        claimed.map(|()| (guard.record.clone(), guard.portrait_count))
    };
    let (record, portrait_count) = match claim {
        Ok(claim) => claim,
        Err(err) => {
            info!("Generation refused for session {}: {}", session_id, err);
            session.lock().message = Some(StatusMessage::error(err.to_string()));
            return redirect_home(&session_id);
        }
    };

    let _release = GenerationGuard::new(session.clone());
    let mut timer = start_action_timer("generate", &session_id, Some(record.display_name()));

    match generate_character(&state.deps, &record, portrait_count).await {
        Ok(outcome) => {
            let name = outcome.record.display_name().to_string();
            info!(
                "Session {} finished {} with {} portrait(s); exported {} (archive id {:?})",
                session_id,
                name,
                outcome.portraits.len(),
                outcome.json_path.display(),
                outcome.archive_id
            );
            let mut session = session.lock();
            session.record = outcome.record;
            session.last_document = Some(GeneratedDocument {
                html: outcome.html,
                pdf_path: outcome.pdf_path,
                html_path: outcome.html_path,
            });
            session.message = Some(StatusMessage::info(format!(
                "Character sheet for {name} is ready."
            )));
        }
        Err(err) => {
            error!(
                kind = err.kind(),
                "Generation failed for session {}: {}", session_id, err
            );
            timer.mark_status("error", Some(err.kind().to_string()));
            session.lock().message = Some(StatusMessage::error(format!(
                "Could not generate the character sheet. {err}"
            )));
        }
    }
    timer.log_completed();

    redirect_home(&session_id)
}

pub async fn reset(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let (session_id, session) = state.session(session_cookie(&headers).as_deref());
    let mut session = session.lock();
    if session.is_generating() {
        session.message = Some(StatusMessage::error(ForgeError::Busy.to_string()));
    } else {
        *session = Session::new(state.default_portrait_count);
        session.message = Some(StatusMessage::info("Started a new character."));
    }
    drop(session);
    redirect_home(&session_id)
}
