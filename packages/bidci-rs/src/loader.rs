use crate::backend::{Event, RawInfo, SignalBackend};
use crate::bids::BidsPath;
use crate::config::{Config, EventIdMap};
use crate::error::Result;
use std::path::{Path, PathBuf};

/// Resolves and reads one (subject, run) recording of a BIDS dataset.
#[derive(Debug, Clone)]
pub struct BidsDataLoader {
    bids_path: BidsPath,
    event_id: Option<EventIdMap>,
    verbose: bool,
}

impl BidsDataLoader {
    pub fn new(config: &Config, subject: &str, run: &str) -> Self {
        let bids_path = BidsPath::new(&config.bids_root, subject, &config.task)
            .with_session(config.session.clone())
            .with_run(Some(run.to_string()));
        Self {
            bids_path,
            event_id: config.event_id.clone(),
            verbose: config.verbose,
        }
    }

    pub fn bids_path(&self) -> &BidsPath {
        &self.bids_path
    }

    /// Read the recording and extract its events.
    ///
    /// A missing file fails with [`crate::BidciError::NotFound`] before the
    /// backend is called.
    pub fn load<B: SignalBackend>(&self, backend: &mut B) -> Result<LoadedRecording<B::Raw>> {
        let path = self.bids_path.ensure_exists()?;
        if self.verbose {
            log::info!("Loading BIDS data from: {}", path.display());
        } else {
            log::debug!("Loading BIDS data from: {}", path.display());
        }

        let raw = backend.read_raw_bids(&self.bids_path, self.verbose)?;
        let info = backend.raw_info(&raw)?;
        let (events, event_id) = backend.events_from_annotations(&raw, self.event_id.as_ref())?;

        log::debug!(
            "sub-{} run-{}: {} events, event ids {:?}",
            self.bids_path.subject,
            self.run(),
            events.len(),
            event_id
        );

        Ok(LoadedRecording {
            bids_path: self.bids_path.clone(),
            path,
            raw,
            info,
            events,
            event_id,
        })
    }

    fn run(&self) -> &str {
        self.bids_path.run.as_deref().unwrap_or("")
    }
}

/// A loaded recording: raw handle, metadata and events of one (subject, run).
///
/// Read-only once created. The raw handle only changes by consuming the
/// record through [`LoadedRecording::try_map_raw`].
#[derive(Debug)]
pub struct LoadedRecording<R> {
    bids_path: BidsPath,
    path: PathBuf,
    raw: R,
    info: RawInfo,
    events: Vec<Event>,
    event_id: EventIdMap,
}

impl<R> LoadedRecording<R> {
    pub fn subject(&self) -> &str {
        &self.bids_path.subject
    }

    pub fn run(&self) -> &str {
        self.bids_path.run.as_deref().unwrap_or("")
    }

    pub fn task(&self) -> &str {
        &self.bids_path.task
    }

    pub fn bids_path(&self) -> &BidsPath {
        &self.bids_path
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn raw(&self) -> &R {
        &self.raw
    }

    /// Metadata captured at load time.
    pub fn info(&self) -> &RawInfo {
        &self.info
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn event_id(&self) -> &EventIdMap {
        &self.event_id
    }

    pub fn get_events(&self) -> (&[Event], &EventIdMap) {
        (&self.events, &self.event_id)
    }

    /// Hand the raw handle to `f` and keep whatever handle it returns.
    ///
    /// On error the record is gone, like the handle it held.
    pub fn try_map_raw<T, F>(self, f: F) -> Result<(Self, T)>
    where
        F: FnOnce(R, &[Event], &EventIdMap) -> Result<(R, T)>,
    {
        let LoadedRecording {
            bids_path,
            path,
            raw,
            info,
            events,
            event_id,
        } = self;
        let (raw, out) = f(raw, &events, &event_id)?;
        Ok((
            LoadedRecording {
                bids_path,
                path,
                raw,
                info,
                events,
                event_id,
            },
            out,
        ))
    }

    /// One line describing the recording.
    pub fn summary(&self) -> String {
        format!(
            "Subject: {}, Task: {}, Run: {} | {} channels × {} samples @ {} Hz | {} events | event ids {:?}",
            self.subject(),
            self.task(),
            self.run(),
            self.info.n_channels(),
            self.info.n_times,
            self.info.sfreq,
            self.events.len(),
            self.event_id
        )
    }
}
