//! A JSON document on disk used as the editor form.
//!
//! The file is an object with `title`, `content`, optional `metadata` and
//! `post_id` fields. Any other fields belong to the editor and are carried
//! through untouched when a server draft is written back.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use quire_core::form::FormAdapter;
use quire_core::{Draft, DraftPayload};
use serde_json::{Map, Value};

use crate::error::CliError;

pub type FormValues = Map<String, Value>;

#[derive(Debug)]
pub struct JsonFileForm {
    path: PathBuf,
    default_post_id: Option<String>,
    values: Mutex<FormValues>,
}

impl JsonFileForm {
    /// Read the form file. `default_post_id` applies when the file has no `post_id`.
    pub fn open(path: impl Into<PathBuf>, default_post_id: Option<String>) -> Result<Self, CliError> {
        let path = path.into();
        let values = read_form(&path)?;
        Ok(Self {
            path,
            default_post_id,
            values: Mutex::new(values),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Re-read the file. Returns whether its content changed.
    pub fn reload(&self) -> Result<bool, CliError> {
        let fresh = read_form(&self.path)?;
        let mut values = self.lock();
        if *values == fresh {
            return Ok(false);
        }
        *values = fresh;
        Ok(true)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FormValues> {
        self.values.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_back(&self, values: &FormValues) -> Result<(), CliError> {
        let serialized = serde_json::to_string_pretty(values)?;
        std::fs::write(&self.path, format!("{serialized}\n"))?;
        Ok(())
    }
}

impl FormAdapter for JsonFileForm {
    type Values = FormValues;

    fn current_values(&self) -> Self::Values {
        self.lock().clone()
    }

    fn to_payload(&self, values: &Self::Values) -> DraftPayload {
        let post_id = values
            .get("post_id")
            .and_then(id_text)
            .or_else(|| self.default_post_id.clone());
        DraftPayload {
            title: text_field(values, "title"),
            content: text_field(values, "content"),
            metadata: values
                .get("metadata")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default(),
            post_id,
        }
    }

    fn apply_draft(&self, draft: &Draft) {
        let mut values = self.lock();
        values.insert("title".to_string(), Value::String(draft.title.clone()));
        values.insert("content".to_string(), Value::String(draft.content.clone()));
        values.insert("metadata".to_string(), Value::Object(draft.metadata.clone()));
        if let Err(error) = self.write_back(&values) {
            tracing::warn!(
                "Failed to write server draft into {}: {}",
                self.path.display(),
                error
            );
        }
    }
}

fn read_form(path: &Path) -> Result<FormValues, CliError> {
    let raw = std::fs::read_to_string(path)?;
    let invalid = |reason: String| CliError::InvalidForm {
        path: path.display().to_string(),
        reason,
    };
    match serde_json::from_str::<Value>(&raw) {
        Ok(Value::Object(values)) => Ok(values),
        Ok(_) => Err(invalid("expected a JSON object".to_string())),
        Err(error) => Err(invalid(error.to_string())),
    }
}

fn text_field(values: &FormValues, key: &str) -> String {
    values
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn id_text(value: &Value) -> Option<String> {
    match value {
        Value::String(id) => quire_core::util::normalize_text_option(Some(id.clone())),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}
