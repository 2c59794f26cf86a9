use std::{collections::HashMap, fmt, str::FromStr, sync::Arc};

use bytes::Bytes;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{GenerationRequest, Theme, UploadedFile};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Slot {
    Product,
    Logo,
}

impl FromStr for Slot {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "product" => Ok(Slot::Product),
            "logo" => Ok(Slot::Logo),
            other => Err(format!("unknown upload slot '{other}'")),
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Slot::Product => "product",
            Slot::Logo => "logo",
        })
    }
}

/// Shared table of live preview blobs, addressed by handle id.
#[derive(Clone, Default)]
pub struct PreviewRegistry {
    entries: Arc<RwLock<HashMap<Uuid, (String, Bytes)>>>,
}

impl PreviewRegistry {
    pub fn register(&self, file: &UploadedFile) -> PreviewHandle {
        let id = Uuid::new_v4();
        self.entries.write().insert(id, (file.content_type.clone(), file.bytes.clone()));
        tracing::debug!(%id, file = %file.file_name, "Preview registered");
        PreviewHandle { id, registry: self.clone() }
    }

    pub fn fetch(&self, id: Uuid) -> Option<(String, Bytes)> { self.entries.read().get(&id).cloned() }

    pub fn len(&self) -> usize { self.entries.read().len() }
}

/// Keeps a preview alive; dropping it releases the preview.
pub struct PreviewHandle {
    id: Uuid,
    registry: PreviewRegistry,
}

impl PreviewHandle {
    pub fn id(&self) -> Uuid { self.id }

    pub fn url(&self) -> String { format!("/api/previews/{}", self.id()) }
}

impl Drop for PreviewHandle {
    fn drop(&mut self) {
        self.registry.entries.write().remove(&self.id);
        tracing::debug!(id = %self.id, "Preview released");
    }
}

struct Selected {
    file: UploadedFile,
    preview: PreviewHandle,
}

/// The two required images and the chosen theme.
pub struct UploadSelection {
    product: Option<Selected>,
    logo: Option<Selected>,
    theme: Theme,
    previews: PreviewRegistry,
}

impl UploadSelection {
    pub fn new(previews: PreviewRegistry) -> Self {
        Self { product: None, logo: None, theme: Theme::default(), previews }
    }

    fn slot_mut(&mut self, slot: Slot) -> &mut Option<Selected> {
        match slot {
            Slot::Product => &mut self.product,
            Slot::Logo => &mut self.logo,
        }
    }

    fn slot(&self, slot: Slot) -> Option<&Selected> {
        match slot {
            Slot::Product => self.product.as_ref(),
            Slot::Logo => self.logo.as_ref(),
        }
    }

    /// Replaces one slot; the previous preview for that slot is released.
    pub fn select_file(&mut self, slot: Slot, file: UploadedFile) {
        let preview = self.previews.register(&file);
        tracing::info!(%slot, file = %file.file_name, bytes = file.bytes.len(), "File selected");
        *self.slot_mut(slot) = Some(Selected { file, preview });
    }

    pub fn select_theme(&mut self, theme: Theme) { self.theme = theme; }

    pub fn theme(&self) -> Theme { self.theme }

    pub fn file(&self, slot: Slot) -> Option<&UploadedFile> { self.slot(slot).map(|s| &s.file) }

    pub fn preview_url(&self, slot: Slot) -> Option<String> { self.slot(slot).map(|s| s.preview.url()) }

    pub fn is_complete(&self) -> bool { self.product.is_some() && self.logo.is_some() }

    /// Drops both files. The theme is kept.
    pub fn clear(&mut self) {
        self.product = None;
        self.logo = None;
    }

    pub fn request(&self) -> Option<GenerationRequest> {
        Some(GenerationRequest {
            product: self.product.as_ref()?.file.clone(),
            logo: self.logo.as_ref()?.file.clone(),
            theme: self.theme,
        })
    }
}

#[cfg(test)]
pub(crate) fn sample_file(name: &str) -> UploadedFile {
    UploadedFile {
        file_name: name.to_string(),
        content_type: "image/png".to_string(),
        bytes: Bytes::from(name.as_bytes().to_vec()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn selecting_one_slot_keeps_the_other() {
        let mut selection = UploadSelection::new(PreviewRegistry::default());
        selection.select_file(Slot::Product, sample_file("shoe.png"));
        selection.select_file(Slot::Logo, sample_file("brand.png"));
        selection.select_file(Slot::Product, sample_file("boot.png"));

        assert_eq!(selection.file(Slot::Product).unwrap().file_name, "boot.png");
        assert_eq!(selection.file(Slot::Logo).unwrap().file_name, "brand.png");
    }

    #[test]
    fn request_requires_both_images() {
        let mut selection = UploadSelection::new(PreviewRegistry::default());
        selection.select_theme(Theme::Sporty);
        assert!(selection.request().is_none());
        selection.select_file(Slot::Logo, sample_file("brand.png"));
        assert!(!selection.is_complete());
        assert!(selection.request().is_none());
        selection.select_file(Slot::Product, sample_file("shoe.png"));

        let request = selection.request().unwrap();
        assert_eq!(request.theme, Theme::Sporty);
        assert_eq!(request.product.file_name, "shoe.png");
        assert_eq!(request.logo.file_name, "brand.png");
    }

    #[test]
    fn replaced_preview_is_released() {
        let registry = PreviewRegistry::default();
        let mut selection = UploadSelection::new(registry.clone());
        selection.select_file(Slot::Product, sample_file("a.png"));
        let first = selection.preview_url(Slot::Product).unwrap();
        selection.select_file(Slot::Product, sample_file("b.png"));

        assert_eq!(registry.len(), 1);
        assert_ne!(selection.preview_url(Slot::Product).unwrap(), first);
    }

    #[test]
    fn clear_and_drop_release_every_preview() {
        let registry = PreviewRegistry::default();
        let mut selection = UploadSelection::new(registry.clone());
        selection.select_file(Slot::Product, sample_file("a.png"));
        selection.select_file(Slot::Logo, sample_file("b.png"));
        assert_eq!(registry.len(), 2);

        selection.clear();
        assert_eq!(registry.len(), 0);
        assert_eq!(selection.theme(), Theme::Minimal);

        selection.select_file(Slot::Logo, sample_file("c.png"));
        assert_eq!(registry.len(), 1);
        drop(selection);
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn preview_serves_uploaded_bytes() {
        let registry = PreviewRegistry::default();
        let handle = registry.register(&sample_file("logo.png"));
        let (content_type, bytes) = registry.fetch(handle.id()).unwrap();
        assert_eq!(content_type, "image/png");
        assert_eq!(&bytes[..], b"logo.png");
        assert_eq!(handle.url(), format!("/api/previews/{}", handle.id()));
    }

    #[test]
    fn slot_names_round_trip() {
        assert_eq!("logo".parse::<Slot>(), Ok(Slot::Logo));
        assert_eq!(Slot::Product.to_string(), "product");
        assert!("banner".parse::<Slot>().is_err());
    }
}
