//! Signal backend served by an external bridge process.
//!
//! The bridge owns the actual signal-processing library and keeps every
//! object it creates in memory; this side only ever sees opaque string
//! handles. Requests and responses are single-line JSON objects:
//!
//! ```text
//! -> {"id": 3, "method": "filter", "params": {"raw": "raw-1", "l_freq": 1.0, "h_freq": 40.0}}
//! <- {"id": 3, "result": "raw-1"}
//! <- {"id": 4, "error": {"kind": "not_found", "message": "..."}}
//! ```

use crate::backend::*;
use crate::bids::BidsPath;
use crate::config::{Band, EventIdMap};
use crate::error::{BidciError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

/// Bridge executable name
pub const BRIDGE_NAME: &str = "bidci-bridge";

/// Environment variable holding the full bridge path
pub const BRIDGE_ENV_VAR: &str = "BIDCI_BRIDGE_PATH";

/// Environment variable holding an install prefix (`$BIDCI_HOME/bin/bidci-bridge`)
pub const BRIDGE_HOME_ENV_VAR: &str = "BIDCI_HOME";

/// Directories searched when no path is configured
pub const DEFAULT_BRIDGE_PATHS: &[&str] = &["~/.local/bin", "/usr/local/bin", "/opt/bidci/bin"];

/// Locate the bridge executable.
///
/// Order: explicit path, `$BIDCI_BRIDGE_PATH`, `$BIDCI_HOME/bin`, then
/// [`DEFAULT_BRIDGE_PATHS`]. An explicit path that does not exist is not
/// replaced by a search.
pub fn find_bridge(explicit_path: Option<&str>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        let p = crate::config::expand_home(path);
        return p.exists().then_some(p);
    }

    if let Ok(env_path) = std::env::var(BRIDGE_ENV_VAR) {
        let p = crate::config::expand_home(&env_path);
        if p.exists() {
            return Some(p);
        }
    }

    if let Ok(home_path) = std::env::var(BRIDGE_HOME_ENV_VAR) {
        let p = crate::config::expand_home(&home_path).join("bin").join(BRIDGE_NAME);
        if p.exists() {
            return Some(p);
        }
    }

    DEFAULT_BRIDGE_PATHS
        .iter()
        .map(|dir| crate::config::expand_home(dir).join(BRIDGE_NAME))
        .find(|p| p.exists())
}

macro_rules! handle {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }
    };
}

handle!(
    /// Continuous recording held by the bridge.
    RawHandle
);
handle!(EpochsHandle);
handle!(EvokedHandle);
handle!(
    /// Open figure; closed by the bridge once saved or shown.
    FigureHandle
);

#[derive(Serialize)]
struct Request<'a> {
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Deserialize)]
struct Response {
    id: u64,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RemoteError>,
}

#[derive(Deserialize)]
struct RemoteError {
    kind: String,
    message: String,
}

#[derive(Deserialize)]
struct EventsReply {
    events: Vec<Event>,
    event_id: EventIdMap,
}

/// Line-delimited JSON request/response client.
pub struct BridgeClient<R: BufRead, W: Write> {
    reader: R,
    writer: W,
    next_id: u64,
}

impl<R: BufRead, W: Write> BridgeClient<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader,
            writer,
            next_id: 1,
        }
    }

    pub fn writer(&self) -> &W {
        &self.writer
    }

    /// Send one request and wait for its response.
    pub fn call<T: DeserializeOwned>(&mut self, method: &str, params: Value) -> Result<T> {
        let id = self.next_id;
        self.next_id += 1;

        let line = serde_json::to_string(&Request { id, method, params })?;
        log::trace!("bridge <- {}", line);
        self.writer.write_all(line.as_bytes())?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;

        let mut reply = String::new();
        if self.reader.read_line(&mut reply)? == 0 {
            return Err(BidciError::Bridge(format!(
                "bridge closed its output while handling '{}'",
                method
            )));
        }
        log::trace!("bridge -> {}", reply.trim_end());

        let response: Response = serde_json::from_str(&reply)
            .map_err(|e| BidciError::Protocol(format!("malformed response to '{}': {}", method, e)))?;
        if response.id != id {
            return Err(BidciError::Protocol(format!(
                "response id {} does not match request id {} ('{}')",
                response.id, id, method
            )));
        }

        if let Some(err) = response.error {
            return Err(match err.kind.as_str() {
                "not_found" => BidciError::NotFound(err.message),
                _ => BidciError::backend(method, format!("{} ({})", err.message, err.kind)),
            });
        }

        let result = response.result.unwrap_or(Value::Null);
        serde_json::from_value(result)
            .map_err(|e| BidciError::Protocol(format!("unexpected result for '{}': {}", method, e)))
    }
}

/// [`SignalBackend`] talking to a bridge process.
pub struct BridgeBackend<R: BufRead = BufReader<ChildStdout>, W: Write = ChildStdin> {
    client: BridgeClient<R, W>,
    child: Option<Child>,
    bridge_path: Option<PathBuf>,
}

impl BridgeBackend {
    /// Start the bridge at `bridge_path`.
    pub fn spawn<P: AsRef<Path>>(bridge_path: P) -> Result<Self> {
        let bridge_path = bridge_path.as_ref().to_path_buf();
        if !bridge_path.exists() {
            return Err(BidciError::BridgeNotFound(bridge_path.display().to_string()));
        }

        log::info!("Starting bridge: {}", bridge_path.display());
        Self::from_command(Command::new(&bridge_path))
    }

    /// Start a bridge from a prepared command, e.g. an interpreter plus script.
    ///
    /// Standard input and output are replaced by the protocol pipes.
    pub fn from_command(mut command: Command) -> Result<Self> {
        let bridge_path = PathBuf::from(command.get_program());
        let mut child = command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| BidciError::Bridge(format!("failed to start bridge: {}", e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| BidciError::Bridge("bridge stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| BidciError::Bridge("bridge stdout unavailable".to_string()))?;

        Ok(Self {
            client: BridgeClient::new(BufReader::new(stdout), stdin),
            child: Some(child),
            bridge_path: Some(bridge_path),
        })
    }

    /// Start the bridge found by [`find_bridge`].
    pub fn discover() -> Result<Self> {
        match find_bridge(None) {
            Some(path) => Self::spawn(path),
            None => Err(BidciError::BridgeNotFound(format!(
                "{} (set ${} or ${})",
                BRIDGE_NAME, BRIDGE_ENV_VAR, BRIDGE_HOME_ENV_VAR
            ))),
        }
    }
}

impl<R: BufRead, W: Write> BridgeBackend<R, W> {
    /// Use an already connected transport.
    pub fn with_transport(reader: R, writer: W) -> Self {
        Self {
            client: BridgeClient::new(reader, writer),
            child: None,
            bridge_path: None,
        }
    }

    pub fn bridge_path(&self) -> Option<&Path> {
        self.bridge_path.as_deref()
    }

    pub fn client(&self) -> &BridgeClient<R, W> {
        &self.client
    }
}

impl<R: BufRead, W: Write> Drop for BridgeBackend<R, W> {
    fn drop(&mut self) {
        let Some(mut child) = self.child.take() else {
            return;
        };
        if let Err(e) = self.client.call::<()>("shutdown", json!({})) {
            log::warn!("Bridge did not shut down cleanly: {}", e);
            let _ = child.kill();
        }
        match child.wait() {
            Ok(status) => log::debug!("Bridge exited with {}", status),
            Err(e) => log::warn!("Failed to reap bridge process: {}", e),
        }
    }
}

impl<R: BufRead, W: Write> SignalBackend for BridgeBackend<R, W> {
    type Raw = RawHandle;
    type Epochs = EpochsHandle;
    type Evoked = EvokedHandle;
    type Figure = FigureHandle;

    fn read_raw_bids(&mut self, path: &BidsPath, verbose: bool) -> Result<RawHandle> {
        self.client.call(
            "read_raw_bids",
            json!({
                "root": path.root,
                "subject": path.subject,
                "session": path.session,
                "task": path.task,
                "run": path.run,
                "suffix": path.suffix,
                "extension": path.extension,
                "verbose": verbose,
            }),
        )
    }

    fn raw_info(&mut self, raw: &RawHandle) -> Result<RawInfo> {
        self.client.call("raw_info", json!({ "raw": raw }))
    }

    fn events_from_annotations(
        &mut self,
        raw: &RawHandle,
        event_id: Option<&EventIdMap>,
    ) -> Result<(Vec<Event>, EventIdMap)> {
        let reply: EventsReply = self.client.call(
            "events_from_annotations",
            json!({ "raw": raw, "event_id": event_id }),
        )?;
        Ok((reply.events, reply.event_id))
    }

    fn load_data(&mut self, raw: RawHandle) -> Result<RawHandle> {
        self.client.call("load_data", json!({ "raw": raw }))
    }

    fn filter(&mut self, raw: RawHandle, band: Band) -> Result<RawHandle> {
        self.client.call(
            "filter",
            json!({ "raw": raw, "l_freq": band.low, "h_freq": band.high }),
        )
    }

    fn notch_filter(&mut self, raw: RawHandle, freq: f64) -> Result<RawHandle> {
        self.client
            .call("notch_filter", json!({ "raw": raw, "freqs": freq }))
    }

    fn epochs(
        &mut self,
        raw: &RawHandle,
        events: &[Event],
        event_id: &EventIdMap,
        request: &EpochRequest,
    ) -> Result<EpochsHandle> {
        self.client.call(
            "epochs",
            json!({
                "raw": raw,
                "events": events,
                "event_id": event_id,
                "tmin": request.tmin,
                "tmax": request.tmax,
                "baseline": request.baseline,
                "picks": request.picks,
                "preload": request.preload,
                "event_repeated": request.event_repeated,
            }),
        )
    }

    fn epochs_shape(&mut self, epochs: &EpochsHandle) -> Result<EpochsShape> {
        self.client.call("epochs_shape", json!({ "epochs": epochs }))
    }

    fn set_montage(&mut self, raw: RawHandle, kind: &str) -> Result<RawHandle> {
        self.client
            .call("set_montage", json!({ "raw": raw, "kind": kind }))
    }

    fn average(&mut self, epochs: &EpochsHandle, label: &str) -> Result<EvokedHandle> {
        self.client
            .call("average", json!({ "epochs": epochs, "label": label }))
    }

    fn evoked_has_montage(&mut self, evoked: &EvokedHandle) -> Result<bool> {
        self.client
            .call("evoked_has_montage", json!({ "evoked": evoked }))
    }

    fn set_evoked_montage(&mut self, evoked: EvokedHandle, kind: &str) -> Result<EvokedHandle> {
        self.client
            .call("set_evoked_montage", json!({ "evoked": evoked, "kind": kind }))
    }

    fn plot_raw(&mut self, raw: &RawHandle, options: &RawPlotOptions) -> Result<FigureHandle> {
        self.client
            .call("plot_raw", json!({ "raw": raw, "options": options }))
    }

    fn plot_psd(&mut self, raw: &RawHandle, options: &PsdPlotOptions) -> Result<FigureHandle> {
        self.client
            .call("plot_psd", json!({ "raw": raw, "options": options }))
    }

    fn plot_sensors(&mut self, raw: &RawHandle) -> Result<FigureHandle> {
        self.client.call(
            "plot_sensors",
            json!({ "raw": raw, "kind": "topomap", "ch_type": "eeg", "show_names": true }),
        )
    }

    fn plot_epochs_image(
        &mut self,
        epochs: &EpochsHandle,
        label: &str,
        picks: &str,
    ) -> Result<FigureHandle> {
        self.client.call(
            "plot_epochs_image",
            json!({ "epochs": epochs, "label": label, "picks": picks, "combine": "mean" }),
        )
    }

    fn plot_topomap(&mut self, evoked: &EvokedHandle, times: &[f64]) -> Result<FigureHandle> {
        self.client.call(
            "plot_topomap",
            json!({ "evoked": evoked, "times": times, "ch_type": "eeg" }),
        )
    }

    fn compute_psd(
        &mut self,
        epochs: &EpochsHandle,
        label: &str,
        fmin: f64,
        fmax: f64,
    ) -> Result<PsdData> {
        self.client.call(
            "compute_psd",
            json!({ "epochs": epochs, "label": label, "fmin": fmin, "fmax": fmax }),
        )
    }

    fn plot_psd_band(&mut self, plot: &PsdBandPlot) -> Result<FigureHandle> {
        self.client.call("plot_psd_band", json!({ "plot": plot }))
    }

    fn save_figure(&mut self, figure: FigureHandle, path: &Path, dpi: u32) -> Result<()> {
        self.client.call(
            "save_figure",
            json!({ "figure": figure, "path": path, "dpi": dpi }),
        )
    }

    fn show_figure(&mut self, figure: FigureHandle) -> Result<()> {
        self.client.call("show_figure", json!({ "figure": figure }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn backend(replies: &[&str]) -> BridgeBackend<Cursor<Vec<u8>>, Vec<u8>> {
        let mut script = replies.join("\n");
        script.push('\n');
        BridgeBackend::with_transport(Cursor::new(script.into_bytes()), Vec::new())
    }

    fn sent(backend: &BridgeBackend<Cursor<Vec<u8>>, Vec<u8>>) -> Vec<Value> {
        String::from_utf8(backend.client().writer().clone())
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[test]
    fn test_request_framing_and_handles() {
        let mut b = backend(&[
            r#"{"id": 1, "result": "raw-1"}"#,
            r#"{"id": 2, "result": "raw-2"}"#,
        ]);
        let path = BidsPath::new("/data", "01", "mi").with_run(Some("02".into()));
        let raw = b.read_raw_bids(&path, true).unwrap();
        assert_eq!(raw, RawHandle("raw-1".into()));
        let filtered = b.filter(raw, Band::new(1.0, 40.0)).unwrap();
        assert_eq!(filtered.as_str(), "raw-2");

        let requests = sent(&b);
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0]["id"], 1);
        assert_eq!(requests[0]["method"], "read_raw_bids");
        assert_eq!(requests[0]["params"]["subject"], "01");
        assert_eq!(requests[0]["params"]["run"], "02");
        assert_eq!(requests[0]["params"]["session"], Value::Null);
        assert_eq!(requests[1]["method"], "filter");
        assert_eq!(requests[1]["params"]["raw"], "raw-1");
        assert_eq!(requests[1]["params"]["h_freq"], 40.0);
    }

    #[test]
    fn test_events_reply() {
        let mut b = backend(&[
            r#"{"id": 1, "result": {"events": [{"sample": 480, "previous": 0, "code": 2}], "event_id": {"T1": 2}}}"#,
        ]);
        let (events, map) = b
            .events_from_annotations(&RawHandle("raw-1".into()), None)
            .unwrap();
        assert_eq!(events, vec![Event { sample: 480, previous: 0, code: 2 }]);
        assert_eq!(map["T1"], 2);
        assert_eq!(sent(&b)[0]["params"]["event_id"], Value::Null);
    }

    #[test]
    fn test_remote_errors_are_mapped() {
        let mut b = backend(&[
            r#"{"id": 1, "error": {"kind": "not_found", "message": "sub-09 missing"}}"#,
            r#"{"id": 2, "error": {"kind": "failed", "message": "filter length too long"}}"#,
        ]);
        let path = BidsPath::new("/data", "09", "mi");
        assert!(b.read_raw_bids(&path, false).unwrap_err().is_not_found());
        let err = b.filter(RawHandle("r".into()), Band::new(1.0, 2.0)).unwrap_err();
        assert!(matches!(err, BidciError::Backend { ref call, .. } if call == "filter"));
    }

    #[test]
    fn test_protocol_violations() {
        let mut b = backend(&[r#"{"id": 7, "result": true}"#]);
        let err = b.evoked_has_montage(&EvokedHandle("e".into())).unwrap_err();
        assert!(matches!(err, BidciError::Protocol(_)));

        let mut b = backend(&["not json"]);
        let err = b.epochs_shape(&EpochsHandle("e".into())).unwrap_err();
        assert!(matches!(err, BidciError::Protocol(_)));

        let mut b = backend(&[r#"{"id": 1, "result": "not a shape"}"#]);
        let err = b.epochs_shape(&EpochsHandle("e".into())).unwrap_err();
        assert!(matches!(err, BidciError::Protocol(_)));
    }

    #[test]
    fn test_closed_bridge() {
        let mut b = BridgeBackend::with_transport(Cursor::new(Vec::new()), Vec::new());
        let err = b.show_figure(FigureHandle("f".into())).unwrap_err();
        assert!(matches!(err, BidciError::Bridge(_)));
    }

    #[test]
    fn test_unit_results_accept_null() {
        let mut b = backend(&[r#"{"id": 1, "result": null}"#, r#"{"id": 2}"#]);
        b.save_figure(FigureHandle("f".into()), Path::new("/out/a.png"), 300)
            .unwrap();
        b.show_figure(FigureHandle("g".into())).unwrap();
        let requests = sent(&b);
        assert_eq!(requests[0]["params"]["dpi"], 300);
        assert_eq!(requests[0]["params"]["path"], "/out/a.png");
    }

    #[test]
    fn test_epochs_image_forwards_picks() {
        let mut b = backend(&[r#"{"id": 1, "result": "fig-1"}"#]);
        let fig = b
            .plot_epochs_image(&EpochsHandle("ep".into()), "left", "eog")
            .unwrap();
        assert_eq!(fig.as_str(), "fig-1");
        let params = &sent(&b)[0]["params"];
        assert_eq!(params["picks"], "eog");
        assert_eq!(params["label"], "left");
        assert_eq!(params["combine"], "mean");
    }

    #[test]
    fn test_find_bridge_explicit_path() {
        assert!(find_bridge(Some("/nonexistent_dir_12345/bidci-bridge")).is_none());
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let found = find_bridge(Some(tmp.path().to_str().unwrap())).unwrap();
        assert_eq!(found, tmp.path());
    }

    /// Echo-style bridge: logs every request line, answers `true`, exits on shutdown.
    #[cfg(unix)]
    const SCRIPT_BRIDGE: &str = r#"
while IFS= read -r line; do
  printf '%s\n' "$line" >> "$1"
  id=$(printf '%s' "$line" | sed 's/^{"id":\([0-9]*\),.*/\1/')
  case "$line" in
    *'"method":"shutdown"'*) printf '{"id":%s,"result":null}\n' "$id"; exit 0 ;;
    *) printf '{"id":%s,"result":true}\n' "$id" ;;
  esac
done
"#;

    #[cfg(unix)]
    fn script_bridge(dir: &Path, body: &str) -> (BridgeBackend, PathBuf) {
        let script = dir.join("bridge.sh");
        let log = dir.join("requests.log");
        std::fs::write(&script, body).unwrap();
        let mut command = Command::new("/bin/sh");
        command.arg(&script).arg(&log);
        (BridgeBackend::from_command(command).unwrap(), log)
    }

    #[cfg(unix)]
    #[test]
    fn test_child_round_trip_and_shutdown_on_drop() {
        let tmp = tempfile::tempdir().unwrap();
        let (mut b, log) = script_bridge(tmp.path(), SCRIPT_BRIDGE);
        assert_eq!(b.bridge_path(), Some(Path::new("/bin/sh")));

        assert!(b.evoked_has_montage(&EvokedHandle("evoked-1".into())).unwrap());
        assert!(b.evoked_has_montage(&EvokedHandle("evoked-2".into())).unwrap());
        drop(b);

        let lines: Vec<Value> = std::fs::read_to_string(&log)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0]["method"], "evoked_has_montage");
        assert_eq!(lines[0]["params"]["evoked"], "evoked-1");
        assert_eq!(lines[2]["id"], 3);
        assert_eq!(lines[2]["method"], "shutdown");
    }

    #[cfg(unix)]
    #[test]
    fn test_child_that_exits_early_is_reaped() {
        let tmp = tempfile::tempdir().unwrap();
        let (mut b, log) = script_bridge(tmp.path(), "exit 0\n");

        assert!(b.show_figure(FigureHandle("f".into())).is_err());
        // Dropping sends shutdown into a closed pipe, kills and waits; it must return.
        drop(b);
        assert!(!log.exists());
    }

    #[test]
    fn test_spawn_missing_bridge() {
        let err = BridgeBackend::spawn("/nonexistent/bidci-bridge").err().unwrap();
        assert!(matches!(err, BidciError::BridgeNotFound(_)));
    }
}
