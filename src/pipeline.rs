use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn};

use crate::character::{CharacterRecord, ExampleLibrary};
use crate::config::PortraitEmbed;
use crate::db::database::Database;
use crate::error::{ForgeError, ForgeResult};
use crate::llm::{build_completion_turns, CompletionClient, PortraitClient};
use crate::render::{
    portrait_sources, render_html, render_pdf_file, standalone_document, PortraitAsset,
};
use crate::storage::{unique_file_name, write_file, StorageLayout};
use crate::tools::object_uploader::ObjectUploader;

pub const MIN_PORTRAITS: usize = 1;
pub const MAX_PORTRAITS: usize = 5;

/// Collaborators for one generation run. Shared by every session.
#[derive(Clone)]
pub struct GenerationDeps {
    pub completion: Arc<dyn CompletionClient>,
    pub portraits: Arc<dyn PortraitClient>,
    pub examples: ExampleLibrary,
    pub storage: StorageLayout,
    pub uploader: Option<ObjectUploader>,
    pub database: Option<Database>,
    pub portrait_embed: PortraitEmbed,
}

#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    pub record: CharacterRecord,
    pub html: String,
    pub html_path: PathBuf,
    pub pdf_path: PathBuf,
    pub json_path: PathBuf,
    pub portraits: Vec<PortraitAsset>,
    pub archive_id: Option<i64>,
}

pub fn clamp_portrait_count(count: usize) -> usize {
    count.clamp(MIN_PORTRAITS, MAX_PORTRAITS)
}

async fn complete_record(
    deps: &GenerationDeps,
    record: &mut CharacterRecord,
) -> ForgeResult<()> {
    let turns = build_completion_turns(&deps.examples, record);
    let text = deps.completion.complete(&turns).await?;
    let generated = CharacterRecord::from_completion_text(&text)?;
    record.merge_completion(generated);
    record.validate();
    Ok(())
}

async fn generate_portraits(
    deps: &GenerationDeps,
    record: &CharacterRecord,
    count: usize,
) -> ForgeResult<Vec<PortraitAsset>> {
    let prompt = record.portrait_prompt.trim();
    if prompt.is_empty() {
        info!(
            "No portrait prompt for {}; skipping portraits",
            record.display_name()
        );
        return Ok(Vec::new());
    }

    let mut assets = Vec::with_capacity(count);
    for _ in 0..count {
        let path = deps
            .portraits
            .generate_portrait(prompt, record.display_name())
            .await?;
        let mut asset = PortraitAsset::local(path);
        if let Some(uploader) = &deps.uploader {
            match uploader.upload_file(&asset.path).await {
                Ok(url) => asset.public_url = Some(url),
                Err(err) => warn!("Portrait upload failed for {}: {}", asset.path.display(), err),
            }
        }
        assets.push(asset);
    }
    Ok(assets)
}

/// Runs merge, portraits, rendering and export on a copy of `current`.
/// The caller's record is untouched; on error nothing is committed.
pub async fn generate_character(
    deps: &GenerationDeps,
    current: &CharacterRecord,
    portrait_count: usize,
) -> ForgeResult<GenerationOutcome> {
    let mut record = current.clone();
    record.resolve_custom_choices();
    record.portrait_filenames.clear();
    record.pdf_path = None;

    complete_record(deps, &mut record).await?;

    let portraits =
        generate_portraits(deps, &record, clamp_portrait_count(portrait_count)).await?;
    record.portrait_filenames = portraits
        .iter()
        .map(|portrait| portrait.path.display().to_string())
        .collect();

    let sources = portrait_sources(&portraits, deps.portrait_embed).await?;
    let html = render_html(&record, &sources);

    let pdf_path = render_pdf_file(&record, &portraits, &deps.storage.sheets_dir).await?;
    record.pdf_path = Some(pdf_path.display().to_string());

    let html_path = deps
        .storage
        .sheets_dir
        .join(unique_file_name(record.display_name(), "", "html"));
    write_file(&html_path, standalone_document(&record, &html).as_bytes()).await?;

    let json_path = deps.storage.export_record(&record).await?;

    let archive_id = match &deps.database {
        Some(database) => Some(database.archive_record(&record).await.map_err(|err| {
            ForgeError::FileSystem(format!("failed to archive character: {err}"))
        })?),
        None => None,
    };

    info!(
        "Generated sheet for {} with {} portrait(s): {}",
        record.display_name(),
        portraits.len(),
        pdf_path.display()
    );

    Ok(GenerationOutcome {
        record,
        html,
        html_path,
        pdf_path,
        json_path,
        portraits,
        archive_id,
    })
}

#[cfg(test)]
pub(crate) mod testing {
    use std::io::Cursor;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use parking_lot::Mutex;

    use crate::error::{ForgeError, ForgeResult};
    use crate::llm::prompt::ChatTurn;
    use crate::llm::{CompletionClient, PortraitClient};

    pub enum StubReply {
        Text(String),
        NetworkFailure,
    }

    pub struct StubCompletion {
        reply: StubReply,
        pub calls: AtomicUsize,
        pub last_turns: Mutex<Vec<ChatTurn>>,
    }

    impl StubCompletion {
        pub fn replying(text: &str) -> Self {
            StubCompletion {
                reply: StubReply::Text(text.to_string()),
                calls: AtomicUsize::new(0),
                last_turns: Mutex::new(Vec::new()),
            }
        }

        pub fn failing() -> Self {
            StubCompletion {
                reply: StubReply::NetworkFailure,
                calls: AtomicUsize::new(0),
                last_turns: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl CompletionClient for StubCompletion {
        async fn complete(&self, turns: &[ChatTurn]) -> ForgeResult<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_turns.lock() = turns.to_vec();
            match &self.reply {
                StubReply::Text(text) => Ok(text.clone()),
                StubReply::NetworkFailure => {
                    Err(ForgeError::Network("completion timed out".to_string()))
                }
            }
        }
    }

    /// Writes a tiny PNG to a fixed path on every call.
    pub struct StubPortraits {
        path: PathBuf,
        fail: bool,
        pub calls: AtomicUsize,
    }

    pub fn png_bytes() -> Vec<u8> {
        let image = image::DynamicImage::ImageRgb8(image::RgbImage::new(4, 4));
        let mut cursor = Cursor::new(Vec::new());
        image
            .write_to(&mut cursor, image::ImageFormat::Png)
            .unwrap();
        cursor.into_inner()
    }

    impl StubPortraits {
        pub fn at(path: &Path) -> Self {
            StubPortraits {
                path: path.to_path_buf(),
                fail: false,
                calls: AtomicUsize::new(0),
            }
        }

        pub fn failing(path: &Path) -> Self {
            StubPortraits {
                fail: true,
                ..StubPortraits::at(path)
            }
        }
    }

    #[async_trait]
    impl PortraitClient for StubPortraits {
        async fn generate_portrait(
            &self,
            _prompt: &str,
            _character_name: &str,
        ) -> ForgeResult<PathBuf> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ForgeError::Network("image download failed with status 500".to_string()));
            }
            std::fs::write(&self.path, png_bytes())
                .map_err(|err| ForgeError::file_system(&self.path, err))?;
            Ok(self.path.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::testing::{StubCompletion, StubPortraits};
    use super::*;
    use crate::character::examples::liora_moonshadow;

    const AELAR_REPLY: &str = r#"{"name": "Aelar", "race": "Elf", "class": "Ranger",
        "description": "A stoic woodland scout.",
        "portrait_prompt": "An elf ranger in green leather armor"}"#;

    struct Harness {
        _root: tempfile::TempDir,
        deps: GenerationDeps,
        completion: Arc<StubCompletion>,
        portraits: Arc<StubPortraits>,
        portrait_path: PathBuf,
    }

    async fn harness(completion: StubCompletion, failing_portraits: bool) -> Harness {
        let root = tempfile::tempdir().unwrap();
        let storage = StorageLayout::under(root.path());
        storage.ensure_directories().await.unwrap();
        let portrait_path = storage.images_dir.join("Aelar_portrait_fixed.png");
        let completion = Arc::new(completion);
        let portraits = Arc::new(if failing_portraits {
            StubPortraits::failing(&portrait_path)
        } else {
            StubPortraits::at(&portrait_path)
        });
        let deps = GenerationDeps {
            completion: completion.clone(),
            portraits: portraits.clone(),
            examples: ExampleLibrary::built_in(),
            storage,
            uploader: None,
            database: None,
            portrait_embed: PortraitEmbed::Path,
        };
        Harness {
            _root: root,
            deps,
            completion,
            portraits,
            portrait_path,
        }
    }

    fn aelar_input() -> CharacterRecord {
        CharacterRecord {
            name: "Aelar".to_string(),
            race: "Elf".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn aelar_end_to_end() {
        let h = harness(StubCompletion::replying(AELAR_REPLY), false).await;
        let outcome = generate_character(&h.deps, &aelar_input(), 1).await.unwrap();

        assert!(outcome.html.contains("Aelar"));
        assert!(outcome.html.contains("Ranger"));
        assert!(outcome.html.contains("A stoic woodland scout."));
        assert_eq!(outcome.html.matches("Aelar_portrait_fixed.png").count(), 1);

        assert_eq!(h.portraits.calls.load(Ordering::SeqCst), 1);
        assert_eq!(outcome.portraits[0].path, h.portrait_path);
        assert_eq!(
            outcome.record.portrait_filenames,
            vec![h.portrait_path.display().to_string()]
        );
        assert!(outcome.pdf_path.starts_with(&h.deps.storage.sheets_dir));
        assert!(outcome.pdf_path.exists());
        assert!(outcome.html_path.exists());
        assert!(outcome.json_path.starts_with(&h.deps.storage.data_dir));
        assert_eq!(
            outcome.record.pdf_path.as_deref(),
            Some(outcome.pdf_path.display().to_string().as_str())
        );
    }

    #[tokio::test]
    async fn filled_fields_survive_a_contradicting_completion() {
        let full = liora_moonshadow();
        let reply = serde_json::json!({ "name": "Someone Else", "class": "Barbarian" }).to_string();
        let h = harness(StubCompletion::replying(&reply), false).await;

        let outcome = generate_character(&h.deps, &full, 1).await.unwrap();
        assert_eq!(outcome.record.to_prompt_json(), full.to_prompt_json());
    }

    #[tokio::test]
    async fn empty_portrait_prompt_skips_the_portrait_client() {
        let reply = r#"{"class": "Ranger", "portrait_prompt": ""}"#;
        let h = harness(StubCompletion::replying(reply), false).await;

        let outcome = generate_character(&h.deps, &aelar_input(), 3).await.unwrap();
        assert_eq!(h.portraits.calls.load(Ordering::SeqCst), 0);
        assert!(outcome.portraits.is_empty());
        assert!(!outcome.html.contains("<img"));
    }

    #[tokio::test]
    async fn one_portrait_call_per_requested_image() {
        let h = harness(StubCompletion::replying(AELAR_REPLY), false).await;
        let outcome = generate_character(&h.deps, &aelar_input(), 3).await.unwrap();
        assert_eq!(h.portraits.calls.load(Ordering::SeqCst), 3);
        assert_eq!(outcome.html.matches("<img").count(), 3);

        let h = harness(StubCompletion::replying(AELAR_REPLY), false).await;
        generate_character(&h.deps, &aelar_input(), 40).await.unwrap();
        assert_eq!(h.portraits.calls.load(Ordering::SeqCst), MAX_PORTRAITS);
    }

    #[tokio::test]
    async fn unparseable_completion_is_a_data_format_error() {
        let h = harness(StubCompletion::replying("Sorry, I can't do that."), false).await;
        let input = aelar_input();
        let err = generate_character(&h.deps, &input, 1).await.unwrap_err();
        assert!(matches!(err, ForgeError::DataFormat(_)));
        assert_eq!(h.portraits.calls.load(Ordering::SeqCst), 0);
        assert_eq!(
            std::fs::read_dir(&h.deps.storage.sheets_dir).unwrap().count(),
            0
        );
    }

    #[tokio::test]
    async fn stage_failures_propagate_without_output() {
        let h = harness(StubCompletion::failing(), false).await;
        let err = generate_character(&h.deps, &aelar_input(), 1).await.unwrap_err();
        assert!(matches!(err, ForgeError::Network(_)));

        let h = harness(StubCompletion::replying(AELAR_REPLY), true).await;
        let err = generate_character(&h.deps, &aelar_input(), 1).await.unwrap_err();
        assert!(matches!(err, ForgeError::Network(_)));
        assert_eq!(h.completion.calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            std::fs::read_dir(&h.deps.storage.data_dir).unwrap().count(),
            0
        );
    }

    #[tokio::test]
    async fn prompt_carries_the_current_record() {
        let h = harness(StubCompletion::replying(AELAR_REPLY), false).await;
        generate_character(&h.deps, &aelar_input(), 1).await.unwrap();
        let turns = h.completion.last_turns.lock().clone();
        let user_turn: serde_json::Value = serde_json::from_str(&turns[3].content).unwrap();
        assert_eq!(user_turn["name"], "Aelar");
        assert_eq!(user_turn["class"], "");
    }

    #[tokio::test]
    async fn finished_characters_are_archived() {
        let mut h = harness(StubCompletion::replying(AELAR_REPLY), false).await;
        let url = format!(
            "sqlite://{}?mode=rwc",
            h.deps.storage.data_dir.join("archive.db").display()
        );
        let database = Database::init(&url).await.unwrap();
        h.deps.database = Some(database.clone());

        let outcome = generate_character(&h.deps, &aelar_input(), 1).await.unwrap();
        assert!(outcome.archive_id.is_some());
        let rows = database.recent_characters(5).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].class, "Ranger");
    }
}
