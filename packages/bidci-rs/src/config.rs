//! Typed pipeline configuration.
//!
//! A configuration document is parsed into an untyped [`serde_yaml::Value`]
//! first and then validated field by field into [`Config`]. Validation never
//! stops at the first problem: every missing or malformed field is collected
//! into a single [`ConfigError::Invalid`].
//!
//! ```yaml
//! bids_root: ~/data/ds003810
//! task: motorimagery
//! subjects: ["01", "02"]
//! runs: ["01"]
//! preprocessing:
//!   bandpass: [1.0, 40.0]
//!   notch_filter: 50
//! save_figures:
//!   enabled: false
//! ```

use crate::error::{ConfigError, FieldError};
use serde::Serialize;
use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const DEFAULT_BANDPASS: Band = Band { low: 1.0, high: 40.0 };
pub const DEFAULT_ORIGINAL_BAND: Band = Band { low: 0.5, high: 45.0 };
pub const DEFAULT_TMIN: f64 = -0.5;
pub const DEFAULT_TMAX: f64 = 2.5;
pub const DEFAULT_MONTAGE: &str = "standard_1020";
pub const DEFAULT_TOPOMAP_TIMES: [f64; 3] = [0.5, 1.0, 1.5];
pub const DEFAULT_EEG_SCALING: f64 = 1e2;
pub const DEFAULT_BASE_DIRECTORY: &str = "results";

/// Label → integer event code, as used for epoching.
pub type EventIdMap = BTreeMap<String, i32>;

/// Frequency band in Hz.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Band {
    pub low: f64,
    pub high: f64,
}

impl Band {
    pub fn new(low: f64, high: f64) -> Self {
        Self { low, high }
    }

    /// Equality up to floating point noise from the YAML parser.
    pub fn same_as(&self, other: &Band) -> bool {
        (self.low - other.low).abs() < 1e-9 && (self.high - other.high).abs() < 1e-9
    }
}

/// Baseline interval in seconds; `None` bounds extend to the epoch edge.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Baseline {
    pub start: Option<f64>,
    pub end: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FigureFormat {
    Png,
    Jpg,
    Jpeg,
    Svg,
    Pdf,
    Eps,
    Tif,
    Tiff,
}

impl FigureFormat {
    pub const SUPPORTED: &'static [&'static str] =
        &["png", "jpg", "jpeg", "svg", "pdf", "eps", "tif", "tiff"];

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "png" => Some(Self::Png),
            "jpg" => Some(Self::Jpg),
            "jpeg" => Some(Self::Jpeg),
            "svg" => Some(Self::Svg),
            "pdf" => Some(Self::Pdf),
            "eps" => Some(Self::Eps),
            "tif" => Some(Self::Tif),
            "tiff" => Some(Self::Tiff),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpg => "jpg",
            Self::Jpeg => "jpeg",
            Self::Svg => "svg",
            Self::Pdf => "pdf",
            Self::Eps => "eps",
            Self::Tif => "tif",
            Self::Tiff => "tiff",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreprocessingConfig {
    /// Load the recording into memory before filtering.
    pub load_data: bool,
    /// The recording was band-passed upstream; never filter it again.
    pub already_filtered: bool,
    /// Band applied upstream when `already_filtered` is set.
    pub original_band: Band,
    pub bandpass: Band,
    pub notch_filter: Option<f64>,
    pub tmin: f64,
    pub tmax: f64,
    pub baseline: Option<Baseline>,
}

impl Default for PreprocessingConfig {
    fn default() -> Self {
        Self {
            load_data: true,
            already_filtered: false,
            original_band: DEFAULT_ORIGINAL_BAND,
            bandpass: DEFAULT_BANDPASS,
            notch_filter: None,
            tmin: DEFAULT_TMIN,
            tmax: DEFAULT_TMAX,
            baseline: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VisualizationConfig {
    pub duration: f64,
    pub start: f64,
    pub n_channels: u32,
    /// Per channel type amplitude scalings; empty means `{eeg: 100.0}`.
    pub scalings: BTreeMap<String, f64>,
    pub use_montage: bool,
    pub montage_kind: String,
    pub psd_fmin: f64,
    pub psd_fmax: f64,
    pub psd_average: bool,
    pub picks: String,
    pub show_events: bool,
    pub topomap_times: Vec<f64>,
}

impl Default for VisualizationConfig {
    fn default() -> Self {
        Self {
            duration: 60.0,
            start: 0.0,
            n_channels: 8,
            scalings: BTreeMap::new(),
            use_montage: false,
            montage_kind: DEFAULT_MONTAGE.to_string(),
            psd_fmin: 0.1,
            psd_fmax: 45.0,
            psd_average: true,
            picks: "eeg".to_string(),
            show_events: true,
            topomap_times: DEFAULT_TOPOMAP_TIMES.to_vec(),
        }
    }
}

impl VisualizationConfig {
    /// Scalings handed to the raw trace plot.
    pub fn resolved_scalings(&self) -> BTreeMap<String, f64> {
        if self.scalings.is_empty() {
            BTreeMap::from([("eeg".to_string(), DEFAULT_EEG_SCALING)])
        } else {
            self.scalings.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SaveFiguresConfig {
    pub enabled: bool,
    pub format: FigureFormat,
    pub dpi: u32,
}

impl Default for SaveFiguresConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            format: FigureFormat::Png,
            dpi: 300,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SanityCheckConfig {
    pub enable_plots: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputConfig {
    pub base_directory: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            base_directory: PathBuf::from(DEFAULT_BASE_DIRECTORY),
        }
    }
}

/// Validated pipeline configuration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Config {
    pub bids_root: PathBuf,
    pub task: String,
    pub session: Option<String>,
    /// Empty when not configured; [`crate::DatasetManager::load_all`] rejects that.
    pub subjects: Vec<String>,
    pub runs: Vec<String>,
    pub verbose: bool,
    /// Explicit annotation label → event code mapping.
    pub event_id: Option<EventIdMap>,
    /// Annotation label → display name used in figure titles.
    pub class_map: Option<BTreeMap<String, String>>,
    /// Isolate failing (subject, run) pairs instead of aborting the batch.
    pub continue_on_error: bool,
    pub preprocessing: PreprocessingConfig,
    pub visualization: VisualizationConfig,
    pub sanity_check: SanityCheckConfig,
    pub output: OutputConfig,
    pub save_figures: SaveFiguresConfig,
}

impl Config {
    /// Configuration with every optional field at its default.
    pub fn new(bids_root: impl Into<PathBuf>, task: impl Into<String>) -> Self {
        Self {
            bids_root: bids_root.into(),
            task: task.into(),
            session: None,
            subjects: Vec::new(),
            runs: Vec::new(),
            verbose: false,
            event_id: None,
            class_map: None,
            continue_on_error: false,
            preprocessing: PreprocessingConfig::default(),
            visualization: VisualizationConfig::default(),
            sanity_check: SanityCheckConfig::default(),
            output: OutputConfig::default(),
            save_figures: SaveFiguresConfig::default(),
        }
    }

    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = expand_home(&path.as_ref().to_string_lossy());
        let text = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        log::debug!("Read configuration from {}", path.display());
        Self::from_yaml_str(&text)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        let value: Value = serde_yaml::from_str(text)?;
        Self::from_value(&value)
    }

    /// Validate an untyped document into a [`Config`].
    pub fn from_value(value: &Value) -> Result<Self, ConfigError> {
        let mut v = Validator::default();

        let root = match value {
            Value::Mapping(map) => map,
            other => {
                return Err(ConfigError::Invalid(vec![FieldError::new(
                    "<root>",
                    format!("expected mapping, found {}", describe(other)),
                )]))
            }
        };

        v.warn_unknown(root, "", ROOT_KEYS);

        let bids_root = v.required_string(root, "", "bids_root");
        let task = v.required_string(root, "", "task");
        if let Some(ref t) = task {
            if t.trim().is_empty() {
                v.fail("task", "must not be empty");
            }
        }

        let session = v.string(root, "", "session");
        let subjects = v.identifier_list(root, "", "subjects").unwrap_or_default();
        let runs = v.identifier_list(root, "", "runs").unwrap_or_default();
        let verbose = v.boolean(root, "", "verbose").unwrap_or(false);
        let event_id = v.int_map(root, "", "event_id");
        let class_map = v.string_map(root, "", "class_map");
        let continue_on_error = v.boolean(root, "", "continue_on_error").unwrap_or(false);

        let preprocessing = match v.section(root, "preprocessing") {
            Some(map) => v.preprocessing(map),
            None => PreprocessingConfig::default(),
        };
        let visualization = match v.section(root, "visualization") {
            Some(map) => v.visualization(map),
            None => VisualizationConfig::default(),
        };
        let sanity_check = match v.section(root, "sanity_check") {
            Some(map) => {
                v.warn_unknown(map, "sanity_check", &["enable_plots"]);
                SanityCheckConfig {
                    enable_plots: v
                        .boolean(map, "sanity_check", "enable_plots")
                        .unwrap_or(false),
                }
            }
            None => SanityCheckConfig::default(),
        };
        let output = match v.section(root, "output") {
            Some(map) => {
                v.warn_unknown(map, "output", &["base_directory"]);
                OutputConfig {
                    base_directory: v
                        .string(map, "output", "base_directory")
                        .map(|s| expand_home(&s))
                        .unwrap_or_else(|| PathBuf::from(DEFAULT_BASE_DIRECTORY)),
                }
            }
            None => OutputConfig::default(),
        };
        let save_figures = match v.section(root, "save_figures") {
            Some(map) => v.save_figures(map),
            None => SaveFiguresConfig::default(),
        };

        if !v.errors.is_empty() {
            return Err(ConfigError::Invalid(v.errors));
        }

        // Both are Some when no errors were recorded.
        let (Some(bids_root), Some(task)) = (bids_root, task) else {
            return Err(ConfigError::Invalid(vec![FieldError::new(
                "bids_root",
                "missing required field",
            )]));
        };

        Ok(Self {
            bids_root: expand_home(&bids_root),
            task,
            session,
            subjects,
            runs,
            verbose,
            event_id,
            class_map,
            continue_on_error,
            preprocessing,
            visualization,
            sanity_check,
            output,
            save_figures,
        })
    }

    /// Display name for an event label, honouring `class_map`.
    pub fn display_label<'a>(&'a self, label: &'a str) -> &'a str {
        self.class_map
            .as_ref()
            .and_then(|m| m.get(label))
            .map(String::as_str)
            .unwrap_or(label)
    }
}

const ROOT_KEYS: &[&str] = &[
    "bids_root",
    "task",
    "session",
    "subjects",
    "runs",
    "verbose",
    "event_id",
    "class_map",
    "continue_on_error",
    "preprocessing",
    "visualization",
    "sanity_check",
    "output",
    "save_figures",
];

const PREPROCESSING_KEYS: &[&str] = &[
    "load_data",
    "already_filtered",
    "original_band",
    "bandpass",
    "notch_filter",
    "tmin",
    "tmax",
    "baseline",
];

const VISUALIZATION_KEYS: &[&str] = &[
    "duration",
    "start",
    "n_channels",
    "scalings",
    "use_montage",
    "montage_kind",
    "psd_fmin",
    "psd_fmax",
    "psd_average",
    "picks",
    "show_events",
    "topomap_times",
];

/// Expand a leading `~/` to the user's home directory.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

fn describe(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Sequence(_) => "sequence",
        Value::Mapping(_) => "mapping",
        Value::Tagged(_) => "tagged value",
    }
}

fn join(section: &str, key: &str) -> String {
    if section.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", section, key)
    }
}

/// Collects field errors while reading typed values out of a mapping.
///
/// Every accessor returns `None` both for absent/null fields and for
/// malformed ones; the latter also record a [`FieldError`].
#[derive(Default)]
struct Validator {
    errors: Vec<FieldError>,
}

impl Validator {
    fn fail(&mut self, field: impl Into<String>, reason: impl Into<String>) {
        self.errors.push(FieldError::new(field, reason));
    }

    fn mismatch(&mut self, field: String, expected: &str, found: &Value) {
        self.fail(field, format!("expected {}, found {}", expected, describe(found)));
    }

    fn warn_unknown(&self, map: &Mapping, section: &str, known: &[&str]) {
        for key in map.keys() {
            match key.as_str() {
                Some(k) if known.contains(&k) => {}
                Some(k) => log::warn!("Ignoring unknown configuration key '{}'", join(section, k)),
                None => log::warn!(
                    "Ignoring non-string configuration key in '{}'",
                    if section.is_empty() { "<root>" } else { section }
                ),
            }
        }
    }

    fn present<'a>(map: &'a Mapping, key: &str) -> Option<&'a Value> {
        match map.get(key) {
            None | Some(Value::Null) => None,
            Some(v) => Some(v),
        }
    }

    fn section<'a>(&mut self, root: &'a Mapping, key: &str) -> Option<&'a Mapping> {
        match Self::present(root, key)? {
            Value::Mapping(map) => Some(map),
            other => {
                self.mismatch(key.to_string(), "mapping", other);
                None
            }
        }
    }

    fn required_string(&mut self, map: &Mapping, section: &str, key: &str) -> Option<String> {
        match map.get(key) {
            None => {
                self.fail(join(section, key), "missing required field");
                None
            }
            Some(Value::String(s)) => Some(s.clone()),
            Some(other) => {
                self.mismatch(join(section, key), "string", other);
                None
            }
        }
    }

    fn string(&mut self, map: &Mapping, section: &str, key: &str) -> Option<String> {
        match Self::present(map, key)? {
            Value::String(s) => Some(s.clone()),
            other => {
                self.mismatch(join(section, key), "string", other);
                None
            }
        }
    }

    fn boolean(&mut self, map: &Mapping, section: &str, key: &str) -> Option<bool> {
        match Self::present(map, key)? {
            Value::Bool(b) => Some(*b),
            other => {
                self.mismatch(join(section, key), "boolean", other);
                None
            }
        }
    }

    fn number(&mut self, field: String, value: &Value) -> Option<f64> {
        match value {
            Value::Number(n) => match n.as_f64() {
                Some(x) if x.is_finite() => Some(x),
                _ => {
                    self.fail(field, "must be a finite number");
                    None
                }
            },
            other => {
                self.mismatch(field, "number", other);
                None
            }
        }
    }

    fn float(&mut self, map: &Mapping, section: &str, key: &str) -> Option<f64> {
        let value = Self::present(map, key)?;
        self.number(join(section, key), value)
    }

    fn integer(&mut self, map: &Mapping, section: &str, key: &str) -> Option<i64> {
        match Self::present(map, key)? {
            Value::Number(n) if n.is_i64() || n.is_u64() => match n.as_i64() {
                Some(i) => Some(i),
                None => {
                    self.fail(join(section, key), "integer out of range");
                    None
                }
            },
            other => {
                self.mismatch(join(section, key), "integer", other);
                None
            }
        }
    }

    fn float_list(&mut self, map: &Mapping, section: &str, key: &str) -> Option<Vec<f64>> {
        let field = join(section, key);
        match Self::present(map, key)? {
            Value::Sequence(items) => {
                let before = self.errors.len();
                let values: Vec<f64> = items
                    .iter()
                    .enumerate()
                    .filter_map(|(i, item)| self.number(format!("{}[{}]", field, i), item))
                    .collect();
                (self.errors.len() == before).then_some(values)
            }
            other => {
                self.mismatch(field, "sequence of numbers", other);
                None
            }
        }
    }

    fn band(&mut self, map: &Mapping, section: &str, key: &str) -> Option<Band> {
        let values = self.float_list(map, section, key)?;
        let field = join(section, key);
        if values.len() != 2 {
            self.fail(field, format!("expected [low, high], found {} value(s)", values.len()));
            return None;
        }
        let band = Band::new(values[0], values[1]);
        if band.low <= 0.0 || band.high <= 0.0 {
            self.fail(field, "band edges must be positive");
            None
        } else if band.low >= band.high {
            self.fail(
                field,
                format!("low edge {} must be below high edge {}", band.low, band.high),
            );
            None
        } else {
            Some(band)
        }
    }

    fn baseline(&mut self, map: &Mapping, section: &str, key: &str) -> Option<Baseline> {
        let field = join(section, key);
        let items = match Self::present(map, key)? {
            Value::Sequence(items) => items,
            other => {
                self.mismatch(field, "sequence [start, end]", other);
                return None;
            }
        };
        if items.len() != 2 {
            self.fail(field, format!("expected [start, end], found {} value(s)", items.len()));
            return None;
        }
        let before = self.errors.len();
        let mut bound = |i: usize| match &items[i] {
            Value::Null => None,
            other => self.number(format!("{}[{}]", field, i), other),
        };
        let start = bound(0);
        let end = bound(1);
        if self.errors.len() != before {
            return None;
        }
        if let (Some(s), Some(e)) = (start, end) {
            if s > e {
                self.fail(field, format!("start {} must not exceed end {}", s, e));
                return None;
            }
        }
        Some(Baseline { start, end })
    }

    fn identifier_list(&mut self, map: &Mapping, section: &str, key: &str) -> Option<Vec<String>> {
        let field = join(section, key);
        match Self::present(map, key)? {
            Value::Sequence(items) => {
                let before = self.errors.len();
                let mut ids = Vec::with_capacity(items.len());
                for (i, item) in items.iter().enumerate() {
                    match item {
                        Value::String(s) if !s.trim().is_empty() => ids.push(s.clone()),
                        Value::String(_) => self.fail(format!("{}[{}]", field, i), "must not be empty"),
                        Value::Number(n) => self.fail(
                            format!("{}[{}]", field, i),
                            format!("expected string, found integer {}; quote identifiers (e.g. \"01\")", n),
                        ),
                        other => self.mismatch(format!("{}[{}]", field, i), "string", other),
                    }
                }
                (self.errors.len() == before).then_some(ids)
            }
            other => {
                self.mismatch(field, "sequence of strings", other);
                None
            }
        }
    }

    fn entries<'a>(&mut self, map: &'a Mapping, section: &str, key: &str) -> Option<Vec<(String, &'a Value)>> {
        let field = join(section, key);
        match Self::present(map, key)? {
            Value::Mapping(inner) => {
                let mut out = Vec::with_capacity(inner.len());
                for (k, val) in inner {
                    match k.as_str() {
                        Some(name) => out.push((name.to_string(), val)),
                        None => self.mismatch(format!("{} (key)", field), "string", k),
                    }
                }
                Some(out)
            }
            other => {
                self.mismatch(field, "mapping", other);
                None
            }
        }
    }

    fn int_map(&mut self, map: &Mapping, section: &str, key: &str) -> Option<EventIdMap> {
        let field = join(section, key);
        let entries = self.entries(map, section, key)?;
        let before = self.errors.len();
        let mut out = EventIdMap::new();
        for (name, val) in entries {
            match val.as_i64().and_then(|i| i32::try_from(i).ok()) {
                Some(code) => {
                    out.insert(name, code);
                }
                None => self.mismatch(format!("{}.{}", field, name), "32-bit integer", val),
            }
        }
        (self.errors.len() == before).then_some(out)
    }

    fn string_map(&mut self, map: &Mapping, section: &str, key: &str) -> Option<BTreeMap<String, String>> {
        let field = join(section, key);
        let entries = self.entries(map, section, key)?;
        let before = self.errors.len();
        let mut out = BTreeMap::new();
        for (name, val) in entries {
            match val {
                Value::String(s) => {
                    out.insert(name, s.clone());
                }
                other => self.mismatch(format!("{}.{}", field, name), "string", other),
            }
        }
        (self.errors.len() == before).then_some(out)
    }

    fn float_map(&mut self, map: &Mapping, section: &str, key: &str) -> Option<BTreeMap<String, f64>> {
        let field = join(section, key);
        let entries = self.entries(map, section, key)?;
        let before = self.errors.len();
        let mut out = BTreeMap::new();
        for (name, val) in entries {
            let entry_field = format!("{}.{}", field, name);
            if let Some(x) = self.number(entry_field.clone(), val) {
                if x <= 0.0 {
                    self.fail(entry_field, "must be positive");
                } else {
                    out.insert(name, x);
                }
            }
        }
        (self.errors.len() == before).then_some(out)
    }

    fn preprocessing(&mut self, map: &Mapping) -> PreprocessingConfig {
        const S: &str = "preprocessing";
        self.warn_unknown(map, S, PREPROCESSING_KEYS);
        let d = PreprocessingConfig::default();

        let notch_filter = self.float(map, S, "notch_filter").and_then(|f| {
            if f <= 0.0 {
                self.fail(join(S, "notch_filter"), "must be positive");
                None
            } else {
                Some(f)
            }
        });

        let tmin = self.float(map, S, "tmin").unwrap_or(d.tmin);
        let tmax = self.float(map, S, "tmax").unwrap_or(d.tmax);
        if tmin >= tmax {
            self.fail(join(S, "tmin"), format!("tmin {} must be below tmax {}", tmin, tmax));
        }

        PreprocessingConfig {
            load_data: self.boolean(map, S, "load_data").unwrap_or(d.load_data),
            already_filtered: self.boolean(map, S, "already_filtered").unwrap_or(d.already_filtered),
            original_band: self.band(map, S, "original_band").unwrap_or(d.original_band),
            bandpass: self.band(map, S, "bandpass").unwrap_or(d.bandpass),
            notch_filter,
            tmin,
            tmax,
            baseline: self.baseline(map, S, "baseline"),
        }
    }

    fn visualization(&mut self, map: &Mapping) -> VisualizationConfig {
        const S: &str = "visualization";
        self.warn_unknown(map, S, VISUALIZATION_KEYS);
        let d = VisualizationConfig::default();

        let duration = self.float(map, S, "duration").unwrap_or(d.duration);
        if duration <= 0.0 {
            self.fail(join(S, "duration"), "must be positive");
        }
        let start = self.float(map, S, "start").unwrap_or(d.start);
        if start < 0.0 {
            self.fail(join(S, "start"), "must not be negative");
        }
        let n_channels = match self.integer(map, S, "n_channels") {
            Some(n) if n >= 1 => u32::try_from(n).unwrap_or(u32::MAX),
            Some(n) => {
                self.fail(join(S, "n_channels"), format!("must be at least 1, found {}", n));
                d.n_channels
            }
            None => d.n_channels,
        };
        let psd_fmin = self.float(map, S, "psd_fmin").unwrap_or(d.psd_fmin);
        let psd_fmax = self.float(map, S, "psd_fmax").unwrap_or(d.psd_fmax);
        if psd_fmin < 0.0 {
            self.fail(join(S, "psd_fmin"), "must not be negative");
        } else if psd_fmin >= psd_fmax {
            self.fail(
                join(S, "psd_fmin"),
                format!("psd_fmin {} must be below psd_fmax {}", psd_fmin, psd_fmax),
            );
        }
        let montage_kind = match self.string(map, S, "montage_kind") {
            Some(kind) if kind.trim().is_empty() => {
                self.fail(join(S, "montage_kind"), "must not be empty");
                d.montage_kind.clone()
            }
            Some(kind) => kind,
            None => d.montage_kind.clone(),
        };
        let topomap_times = match self.float_list(map, S, "topomap_times") {
            Some(times) if times.is_empty() => d.topomap_times.clone(),
            Some(times) => times,
            None => d.topomap_times.clone(),
        };

        VisualizationConfig {
            duration,
            start,
            n_channels,
            scalings: self.float_map(map, S, "scalings").unwrap_or_default(),
            use_montage: self.boolean(map, S, "use_montage").unwrap_or(d.use_montage),
            montage_kind,
            psd_fmin,
            psd_fmax,
            psd_average: self.boolean(map, S, "psd_average").unwrap_or(d.psd_average),
            picks: self.string(map, S, "picks").unwrap_or(d.picks),
            show_events: self.boolean(map, S, "show_events").unwrap_or(d.show_events),
            topomap_times,
        }
    }

    fn save_figures(&mut self, map: &Mapping) -> SaveFiguresConfig {
        const S: &str = "save_figures";
        self.warn_unknown(map, S, &["enabled", "format", "dpi"]);
        let d = SaveFiguresConfig::default();

        let format = match self.string(map, S, "format") {
            Some(ext) => FigureFormat::from_extension(&ext).unwrap_or_else(|| {
                self.fail(
                    join(S, "format"),
                    format!(
                        "unsupported format '{}'. Supported: {}",
                        ext,
                        FigureFormat::SUPPORTED.join(", ")
                    ),
                );
                d.format
            }),
            None => d.format,
        };
        let dpi = match self.integer(map, S, "dpi") {
            Some(n) if n >= 1 && n <= i64::from(u32::MAX) => n as u32,
            Some(n) => {
                self.fail(join(S, "dpi"), format!("must be a positive integer, found {}", n));
                d.dpi
            }
            None => d.dpi,
        };

        SaveFiguresConfig {
            enabled: self.boolean(map, S, "enabled").unwrap_or(d.enabled),
            format,
            dpi,
        }
    }
}
