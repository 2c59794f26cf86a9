use std::{
    sync::{Arc, Weak},
    time::Duration,
};

use parking_lot::Mutex;
use serde::Serialize;
use serde_with::skip_serializing_none;
use tokio::task::AbortHandle;
use tracing::{debug, error, info};

use crate::{
    generator::LayoutGenerator,
    lifecycle::{CycleTicket, GenerationLifecycle, GenerationStatus},
    models::{GenerationRequest, LayoutResult, Theme, UploadedFile},
    presenter::{present, LayoutCard},
    upload::{PreviewRegistry, Slot, UploadSelection},
};

/// Upload selection plus the generation lifecycle of one workspace.
pub struct Studio {
    upload: UploadSelection,
    lifecycle: GenerationLifecycle,
    inflight: Option<AbortHandle>,
}

#[derive(Debug, Serialize)]
pub struct FileView {
    pub file_name: String,
    pub preview_url: String,
}

#[skip_serializing_none]
#[derive(Debug, Serialize)]
pub struct StudioView {
    pub status: GenerationStatus,
    pub theme: Theme,
    pub product: Option<FileView>,
    pub logo: Option<FileView>,
    pub can_submit: bool,
    pub error: Option<String>,
    pub layouts: Vec<LayoutCard>,
}

impl Studio {
    pub fn new(previews: PreviewRegistry) -> Self {
        Self { upload: UploadSelection::new(previews), lifecycle: GenerationLifecycle::default(), inflight: None }
    }

    pub fn can_submit(&self) -> bool { self.upload.is_complete() && !self.lifecycle.is_in_flight() }

    pub fn select_file(&mut self, slot: Slot, file: UploadedFile) { self.upload.select_file(slot, file); }

    pub fn select_theme(&mut self, theme: Theme) { self.upload.select_theme(theme); }

    pub fn status(&self) -> GenerationStatus { self.lifecycle.status() }

    pub fn layouts(&self) -> &[LayoutResult] { self.lifecycle.layouts() }

    pub fn error(&self) -> Option<&str> { self.lifecycle.error() }

    fn abort_inflight(&mut self) {
        if let Some(handle) = self.inflight.take() {
            handle.abort();
            debug!("Aborted in-flight generation");
        }
    }

    /// Back to a blank idle studio, whatever the current state.
    pub fn start_over(&mut self) {
        self.abort_inflight();
        self.lifecycle.start_over();
        self.upload.clear();
        info!("Studio reset");
    }

    pub fn dismiss_error(&mut self) { self.lifecycle.dismiss_error(); }

    pub fn view(&self) -> StudioView {
        let file_view = |slot| {
            let file = self.upload.file(slot)?;
            Some(FileView { file_name: file.file_name.clone(), preview_url: self.upload.preview_url(slot)? })
        };
        // Results are only shown while presenting.
        let layouts = match self.lifecycle.status() {
            GenerationStatus::Presenting => present(self.lifecycle.layouts()),
            _ => Vec::new(),
        };
        StudioView {
            status: self.lifecycle.status(),
            theme: self.upload.theme(),
            product: file_view(Slot::Product),
            logo: file_view(Slot::Logo),
            can_submit: self.can_submit(),
            error: self.error().map(str::to_string),
            layouts,
        }
    }
}

impl Drop for Studio {
    fn drop(&mut self) { self.abort_inflight(); }
}

/// Starts a generation cycle in the background. Returns `false` when
/// submission is blocked (missing images or a cycle already running).
pub fn submit(studio: &Arc<Mutex<Studio>>, generator: Arc<dyn LayoutGenerator>, absorb_delay: Duration) -> bool {
    let mut guard = studio.lock();
    if !guard.can_submit() {
        debug!("Submit ignored: inputs incomplete or generation in flight");
        return false;
    }
    let Some(request) = guard.upload.request() else { return false };
    let Some(ticket) = guard.lifecycle.submit(true) else { return false };

    info!(theme = %request.theme, generator = %generator.describe(), "🚀 Generation cycle started");
    let task = tokio::spawn(drive_cycle(Arc::downgrade(studio), generator, ticket, request, absorb_delay));
    guard.inflight = Some(task.abort_handle());
    true
}

async fn drive_cycle(
    studio: Weak<Mutex<Studio>>,
    generator: Arc<dyn LayoutGenerator>,
    ticket: CycleTicket,
    request: GenerationRequest,
    absorb_delay: Duration,
) {
    tokio::time::sleep(absorb_delay).await;
    {
        let Some(studio) = studio.upgrade() else {
            debug!("Workspace gone before the request went out");
            return;
        };
        if !studio.lock().lifecycle.begin_request(ticket) {
            debug!("Cycle superseded before the request went out");
            return;
        }
    }

    let outcome = generator.generate(&request).await;
    match &outcome {
        Ok(layouts) => info!("✅ Received {} layouts", layouts.len()),
        Err(e) => error!("❌ Layout generation failed: {}", e),
    }

    let Some(studio) = studio.upgrade() else {
        debug!("Workspace gone, dropping generation outcome");
        return;
    };
    let mut guard = studio.lock();
    if guard.lifecycle.resolve(ticket, outcome) {
        guard.inflight = None;
    } else {
        debug!("Dropping outcome of a superseded cycle");
    }
}
