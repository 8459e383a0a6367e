//! Mapping between the host form and the draft payload.
//!
//! The engine never looks at raw form values. It asks the adapter for the
//! payload view and compares payloads, so fields that are not part of the
//! draft can change freely without marking the draft dirty.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use crate::models::{Draft, DraftPayload};

/// Capability set the engine needs from a form: read, map, write back.
pub trait FormAdapter: Send + Sync + 'static {
    type Values: Send + 'static;

    /// Current live values of the form.
    fn current_values(&self) -> Self::Values;

    /// Map live values into the draft payload shape.
    fn to_payload(&self, values: &Self::Values) -> DraftPayload;

    /// Load a server draft back into the form (inverse mapping).
    fn apply_draft(&self, draft: &Draft);

    /// Whether `values` differ from the last saved payload.
    fn is_dirty(&self, values: &Self::Values, last_saved: Option<&DraftPayload>) -> bool {
        payload_differs(&self.to_payload(values), last_saved)
    }
}

impl<F: FormAdapter> FormAdapter for Arc<F> {
    type Values = F::Values;

    fn current_values(&self) -> Self::Values {
        (**self).current_values()
    }

    fn to_payload(&self, values: &Self::Values) -> DraftPayload {
        (**self).to_payload(values)
    }

    fn apply_draft(&self, draft: &Draft) {
        (**self).apply_draft(draft);
    }

    fn is_dirty(&self, values: &Self::Values, last_saved: Option<&DraftPayload>) -> bool {
        (**self).is_dirty(values, last_saved)
    }
}

/// Structural payload comparison.
///
/// With nothing saved yet, only substantive content counts as a change.
pub fn payload_differs(current: &DraftPayload, last_saved: Option<&DraftPayload>) -> bool {
    last_saved.map_or_else(
        || current.has_substantive_content(),
        |last_saved| current != last_saved,
    )
}

type ToPayloadFn<V> = dyn Fn(&V) -> DraftPayload + Send + Sync;
type FromDraftFn<V> = dyn Fn(&Draft, &V) -> V + Send + Sync;

/// Shared in-memory form values with caller-supplied mappings.
pub struct MappedForm<V> {
    values: Arc<RwLock<V>>,
    to_payload: Arc<ToPayloadFn<V>>,
    from_draft: Arc<FromDraftFn<V>>,
}

impl<V> Clone for MappedForm<V> {
    fn clone(&self) -> Self {
        Self {
            values: Arc::clone(&self.values),
            to_payload: Arc::clone(&self.to_payload),
            from_draft: Arc::clone(&self.from_draft),
        }
    }
}

impl<V: fmt::Debug> fmt::Debug for MappedForm<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MappedForm")
            .field("values", &*self.values.read().unwrap_or_else(PoisonError::into_inner))
            .finish_non_exhaustive()
    }
}

impl<V: Clone + Send + Sync + 'static> MappedForm<V> {
    /// `from_draft` receives the server draft and the current values and
    /// returns the merged values to install.
    pub fn new(
        initial: V,
        to_payload: impl Fn(&V) -> DraftPayload + Send + Sync + 'static,
        from_draft: impl Fn(&Draft, &V) -> V + Send + Sync + 'static,
    ) -> Self {
        Self {
            values: Arc::new(RwLock::new(initial)),
            to_payload: Arc::new(to_payload),
            from_draft: Arc::new(from_draft),
        }
    }

    pub fn get(&self) -> V {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set(&self, values: V) {
        *self.values.write().unwrap_or_else(PoisonError::into_inner) = values;
    }

    pub fn update(&self, edit: impl FnOnce(&mut V)) {
        edit(&mut self.values.write().unwrap_or_else(PoisonError::into_inner));
    }
}

impl MappedForm<DraftPayload> {
    /// Form whose values already are the payload.
    pub fn for_payload(initial: DraftPayload) -> Self {
        Self::new(initial, DraftPayload::clone, |draft, current| DraftPayload {
            post_id: draft.post_id.clone().or_else(|| current.post_id.clone()),
            ..draft.payload()
        })
    }
}

impl<V: Clone + Send + Sync + 'static> FormAdapter for MappedForm<V> {
    type Values = V;

    fn current_values(&self) -> V {
        self.get()
    }

    fn to_payload(&self, values: &V) -> DraftPayload {
        (self.to_payload)(values)
    }

    fn apply_draft(&self, draft: &Draft) {
        self.update(|values| *values = (self.from_draft)(draft, values));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[derive(Debug, Clone, Default)]
    struct PostForm {
        title: String,
        body: String,
        cursor_position: usize,
    }

    fn post_form(title: &str, body: &str) -> MappedForm<PostForm> {
        MappedForm::new(
            PostForm {
                title: title.to_string(),
                body: body.to_string(),
                cursor_position: 0,
            },
            |values: &PostForm| DraftPayload::new(values.title.clone(), values.body.clone()),
            |draft, current| PostForm {
                title: draft.title.clone(),
                body: draft.content.clone(),
                ..current.clone()
            },
        )
    }

    #[test]
    fn unrelated_fields_do_not_mark_dirty() {
        let form = post_form("Title", "Body");
        let saved = form.to_payload(&form.current_values());

        form.update(|values| values.cursor_position = 42);
        assert!(!form.is_dirty(&form.current_values(), Some(&saved)));

        form.update(|values| values.body.push('!'));
        assert!(form.is_dirty(&form.current_values(), Some(&saved)));
    }

    #[test]
    fn empty_form_without_snapshot_is_clean() {
        let form = post_form(" ", "");
        assert!(!form.is_dirty(&form.current_values(), None));

        form.update(|values| values.title = "Hello".to_string());
        assert!(form.is_dirty(&form.current_values(), None));
    }

    #[test]
    fn apply_draft_merges_into_current_values() {
        let form = post_form("Local", "Local body");
        form.update(|values| values.cursor_position = 7);

        let draft: Draft = serde_json::from_value(serde_json::json!({
            "id": "draft-1",
            "title": "Remote",
            "content": "Remote body"
        }))
        .unwrap();
        form.apply_draft(&draft);

        let values = form.get();
        assert_eq!(values.title, "Remote");
        assert_eq!(values.body, "Remote body");
        assert_eq!(values.cursor_position, 7);
    }

    #[test]
    fn payload_form_keeps_post_id_when_draft_has_none() {
        let mut initial = DraftPayload::new("a", "b");
        initial.post_id = Some("42".to_string());
        let form = MappedForm::for_payload(initial);

        let draft: Draft =
            serde_json::from_value(serde_json::json!({"id": "d", "title": "x"})).unwrap();
        form.apply_draft(&draft);
        assert_eq!(form.get().title, "x");
        assert_eq!(form.get().post_id.as_deref(), Some("42"));
    }
}
