//! Purpose: Native invocation facade over a resolved engine.
//! Exports: `Session`, `SegmentKind`, `SegmentCounts`, `ArtifactKind`, `ArtifactSnapshot`, `DiagnosticReport`,
//!          `OperationOutcome`, `dir_prefix`.
//! Role: What native callers use: open, resolve everything, marshal, invoke, report, close.
//! Invariants: A `Session` only exists with every entry point resolved.
//! Invariants: Marshaled arguments are created per call and dropped before the call returns.
//! Invariants: Negative raw counts are `Invocation` errors, never clamped to zero.
//! Invariants: One failing operation does not stop `diagnose` from running the rest; nothing is retried.
use std::collections::HashMap;
use std::ffi::{OsStr, OsString};
use std::fs;
use std::path::{MAIN_SEPARATOR, Path, PathBuf};
use std::time::SystemTime;

use serde_json::{Map, Value, json};
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::core::error::{Error, ErrorKind};
use crate::core::handle::EngineHandle;
use crate::core::marshal::NativeStr;
use crate::core::registry::{EntryPoints, Operation, SymbolSource};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum SegmentKind {
    Images,
    Graphics,
    TextFiles,
    DataExtensions,
    ReservedExtensions,
}

impl SegmentKind {
    pub const ALL: [SegmentKind; 5] = [
        SegmentKind::Images,
        SegmentKind::Graphics,
        SegmentKind::TextFiles,
        SegmentKind::DataExtensions,
        SegmentKind::ReservedExtensions,
    ];

    pub fn operation(self) -> Operation {
        match self {
            SegmentKind::Images => Operation::NumImages,
            SegmentKind::Graphics => Operation::NumGraphics,
            SegmentKind::TextFiles => Operation::NumTextFiles,
            SegmentKind::DataExtensions => Operation::NumDes,
            SegmentKind::ReservedExtensions => Operation::NumRes,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SegmentKind::Images => "images",
            SegmentKind::Graphics => "graphics",
            SegmentKind::TextFiles => "text_files",
            SegmentKind::DataExtensions => "data_extensions",
            SegmentKind::ReservedExtensions => "reserved_extensions",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct SegmentCounts {
    pub images: u64,
    pub graphics: u64,
    pub text_files: u64,
    pub data_extensions: u64,
    pub reserved_extensions: u64,
}

impl SegmentCounts {
    pub fn get(&self, kind: SegmentKind) -> u64 {
        match kind {
            SegmentKind::Images => self.images,
            SegmentKind::Graphics => self.graphics,
            SegmentKind::TextFiles => self.text_files,
            SegmentKind::DataExtensions => self.data_extensions,
            SegmentKind::ReservedExtensions => self.reserved_extensions,
        }
    }

    fn set(&mut self, kind: SegmentKind, value: u64) {
        match kind {
            SegmentKind::Images => self.images = value,
            SegmentKind::Graphics => self.graphics = value,
            SegmentKind::TextFiles => self.text_files = value,
            SegmentKind::DataExtensions => self.data_extensions = value,
            SegmentKind::ReservedExtensions => self.reserved_extensions = value,
        }
    }

    /// `(images, graphics, text_files, data_extensions, reserved_extensions)`
    pub fn as_tuple(&self) -> (u64, u64, u64, u64, u64) {
        (
            self.images,
            self.graphics,
            self.text_files,
            self.data_extensions,
            self.reserved_extensions,
        )
    }
}

/// Files the engine writes during extraction, named `{prefix}{index}.{extension}`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ArtifactKind {
    Image,
    DataExtension,
}

impl ArtifactKind {
    pub fn extension(self) -> &'static str {
        match self {
            ArtifactKind::Image => "jp2",
            ArtifactKind::DataExtension => "des",
        }
    }

    pub fn segment(self) -> SegmentKind {
        match self {
            ArtifactKind::Image => SegmentKind::Images,
            ArtifactKind::DataExtension => SegmentKind::DataExtensions,
        }
    }

    pub fn path(self, prefix: &Path, index: u64) -> PathBuf {
        let mut name = OsString::from(prefix.as_os_str());
        name.push(format!("{index}.{}", self.extension()));
        PathBuf::from(name)
    }

    /// Expected artifacts for `count` segments that actually exist on disk.
    pub fn existing(self, prefix: &Path, count: u64) -> Vec<PathBuf> {
        (0..count)
            .map(|index| self.path(prefix, index))
            .filter(|path| path.is_file())
            .collect()
    }

    /// Like `existing`, minus files that are unchanged since `before` was captured.
    pub fn written_since(
        self,
        prefix: &Path,
        count: u64,
        before: &ArtifactSnapshot,
    ) -> Vec<PathBuf> {
        self.existing(prefix, count)
            .into_iter()
            .filter(|path| before.is_changed(path))
            .collect()
    }
}

type FileStamp = (Option<SystemTime>, u64);

fn file_stamp(path: &Path) -> Option<FileStamp> {
    let meta = fs::metadata(path).ok()?;
    meta.is_file().then(|| (meta.modified().ok(), meta.len()))
}

/// Modification stamps of the files an extraction to `prefix` could overwrite.
#[derive(Clone, Debug, Default)]
pub struct ArtifactSnapshot {
    stamps: HashMap<OsString, FileStamp>,
}

impl ArtifactSnapshot {
    /// Records every `.jp2`/`.des` file in the prefix's directory whose name starts with the
    /// prefix's file part. An unreadable directory yields an empty snapshot.
    pub fn capture(prefix: &Path) -> Self {
        let (dir, stem) = split_prefix(prefix);
        let mut stamps = HashMap::new();
        let Ok(entries) = fs::read_dir(&dir) else {
            return Self { stamps };
        };
        for entry in entries.flatten() {
            let name = entry.file_name();
            let text = name.to_string_lossy();
            let is_artifact = [ArtifactKind::Image, ArtifactKind::DataExtension]
                .into_iter()
                .any(|kind| text.ends_with(&format!(".{}", kind.extension())));
            if !is_artifact || !text.starts_with(&*stem) {
                continue;
            }
            if let Some(stamp) = file_stamp(&entry.path()) {
                stamps.insert(name, stamp);
            }
        }
        Self { stamps }
    }

    pub fn len(&self) -> usize {
        self.stamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stamps.is_empty()
    }

    /// True when `path` exists and is new or was modified after the snapshot.
    pub fn is_changed(&self, path: &Path) -> bool {
        let Some(now) = file_stamp(path) else {
            return false;
        };
        match path.file_name() {
            Some(name) => self.stamps.get(name) != Some(&now),
            None => true,
        }
    }
}

/// Splits an output prefix into the directory the engine writes to and the file-name part
/// every artifact starts with.
fn split_prefix(prefix: &Path) -> (PathBuf, std::borrow::Cow<'_, str>) {
    let raw = prefix.as_os_str().to_string_lossy();
    if raw.ends_with(MAIN_SEPARATOR) || raw.ends_with('/') {
        return (prefix.to_path_buf(), "".into());
    }
    let dir = match prefix.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let stem = prefix
        .file_name()
        .map(OsStr::to_string_lossy)
        .unwrap_or_default();
    (dir, stem)
}

/// The engine concatenates its output argument with the artifact name, so a directory
/// needs a trailing separator to receive files inside it.
pub fn dir_prefix(dir: &Path) -> PathBuf {
    let mut prefix = OsString::from(dir.as_os_str());
    let raw = dir.as_os_str().to_string_lossy();
    if !raw.ends_with(MAIN_SEPARATOR) && !raw.ends_with('/') {
        prefix.push(MAIN_SEPARATOR.to_string());
    }
    PathBuf::from(prefix)
}

/// A resolved engine plus whatever it was resolved from.
#[derive(Debug)]
pub struct Session<S: SymbolSource = EngineHandle> {
    // Resolved from `source`; only handed out borrowed from the session.
    entry_points: EntryPoints<'static>,
    source: S,
}

impl Session<EngineHandle> {
    /// Opens the library at `path` and resolves every required entry point.
    ///
    /// A resolution failure drops the freshly opened handle before returning.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let handle = EngineHandle::open(path)?;
        let path = handle.path().to_path_buf();
        Self::with_source(handle).map_err(|err| err.with_path(path))
    }

    pub fn from_config(config: &EngineConfig) -> Result<Self, Error> {
        Self::open(config.locate()?)
    }

    pub fn library_path(&self) -> &Path {
        self.source.path()
    }

    pub fn close(self) -> Result<(), Error> {
        self.source.close()
    }
}

impl<S: SymbolSource> Session<S> {
    pub fn with_source(source: S) -> Result<Self, Error> {
        let entry_points = EntryPoints::resolve_unbound(&source)?;
        Ok(Self {
            entry_points,
            source,
        })
    }

    /// The resolved entry points, borrowed so they cannot outlive the session:
    ///
    /// ```compile_fail
    /// use nitf_bind::Session;
    /// use nitf_bind::core::registry::EntryPoints;
    ///
    /// fn escape(session: Session) -> EntryPoints<'static> {
    ///     let entries = session.entry_points().clone();
    ///     let _ = session.close();
    ///     entries
    /// }
    /// ```
    pub fn entry_points(&self) -> &EntryPoints<'_> {
        &self.entry_points
    }

    /// Gives back the symbol source; the resolved entry points are discarded with the session.
    pub fn into_source(self) -> S {
        self.source
    }

    /// Writes `{output}{index}.jp2` for each image segment of `input`.
    pub fn extract_jp2(&self, input: &Path, output: &Path) -> Result<(), Error> {
        self.extract(Operation::ExtractJp2, input, output)
    }

    /// Writes `{output}{index}.des` for each data extension segment of `input`.
    pub fn extract_des(&self, input: &Path, output: &Path) -> Result<(), Error> {
        self.extract(Operation::ExtractDes, input, output)
    }

    /// The engine prints the version on its own stdout.
    pub fn report_version(&self, input: &Path) -> Result<(), Error> {
        let operation = Operation::GetVersion;
        let input_arg = NativeStr::from_path(input)?;
        debug!(%operation, input = %input.display(), "invoking engine");
        unsafe { self.entry_points.get(operation).call_query(&input_arg) }
    }

    pub fn count(&self, input: &Path, kind: SegmentKind) -> Result<u64, Error> {
        let operation = kind.operation();
        let input_arg = NativeStr::from_path(input)?;
        debug!(%operation, input = %input.display(), "invoking engine");
        let raw = unsafe { self.entry_points.get(operation).call_count(&input_arg) }?;
        u64::try_from(raw).map_err(|_| {
            warn!(%operation, raw, "engine returned a negative count");
            Error::new(ErrorKind::Invocation)
                .with_message(format!("engine returned negative count {raw}"))
                .with_operation(operation.name())
                .with_path(input)
        })
    }

    pub fn num_images(&self, input: &Path) -> Result<u64, Error> {
        self.count(input, SegmentKind::Images)
    }

    pub fn num_graphics(&self, input: &Path) -> Result<u64, Error> {
        self.count(input, SegmentKind::Graphics)
    }

    pub fn num_text_files(&self, input: &Path) -> Result<u64, Error> {
        self.count(input, SegmentKind::TextFiles)
    }

    pub fn num_des(&self, input: &Path) -> Result<u64, Error> {
        self.count(input, SegmentKind::DataExtensions)
    }

    pub fn num_res(&self, input: &Path) -> Result<u64, Error> {
        self.count(input, SegmentKind::ReservedExtensions)
    }

    /// All five counts in order; stops at the first failure.
    pub fn counts(&self, input: &Path) -> Result<SegmentCounts, Error> {
        let mut counts = SegmentCounts::default();
        for kind in SegmentKind::ALL {
            counts.set(kind, self.count(input, kind)?);
        }
        Ok(counts)
    }

    /// Runs the full diagnostic set against `input`.
    ///
    /// With an output prefix, both extractions run first and the artifacts they wrote are
    /// listed; files already present and left untouched are not. Each operation's outcome
    /// is recorded independently.
    pub fn diagnose(&self, input: &Path, output: Option<&Path>) -> DiagnosticReport {
        let mut report = DiagnosticReport::new(input);
        let before = output.map(ArtifactSnapshot::capture).unwrap_or_default();

        let extracted = match output {
            Some(output) => vec![
                (
                    ArtifactKind::Image,
                    report.record(Operation::ExtractJp2, self.extract_jp2(input, output)),
                ),
                (
                    ArtifactKind::DataExtension,
                    report.record(Operation::ExtractDes, self.extract_des(input, output)),
                ),
            ],
            None => Vec::new(),
        };

        report.record(Operation::GetVersion, self.report_version(input));

        for kind in SegmentKind::ALL {
            let result = self.count(input, kind);
            if let Ok(value) = &result {
                report.counts.set(kind, *value);
            }
            report.record_count(kind.operation(), result);
        }

        if let Some(output) = output {
            for (artifact, succeeded) in extracted {
                if succeeded && report.count_succeeded(artifact.segment().operation()) {
                    let count = report.counts.get(artifact.segment());
                    report
                        .artifacts
                        .extend(artifact.written_since(output, count, &before));
                }
            }
        }

        report
    }

    fn extract(&self, operation: Operation, input: &Path, output: &Path) -> Result<(), Error> {
        let input_arg = NativeStr::from_path(input)?;
        let output_arg = NativeStr::from_path(output)?;
        debug!(
            %operation,
            input = %input.display(),
            output = %output.display(),
            "invoking engine"
        );
        unsafe {
            self.entry_points
                .get(operation)
                .call_extract(&input_arg, &output_arg)
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum OutcomeStatus {
    Ok,
    Failed,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OperationOutcome {
    pub operation: Operation,
    pub status: OutcomeStatus,
    pub value: Option<u64>,
    pub error: Option<String>,
    pub error_kind: Option<ErrorKind>,
}

/// Per-operation results of `Session::diagnose`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiagnosticReport {
    pub input: PathBuf,
    pub outcomes: Vec<OperationOutcome>,
    pub artifacts: Vec<PathBuf>,
    counts: SegmentCounts,
}

impl DiagnosticReport {
    fn new(input: &Path) -> Self {
        Self {
            input: input.to_path_buf(),
            outcomes: Vec::new(),
            artifacts: Vec::new(),
            counts: SegmentCounts::default(),
        }
    }

    fn record(&mut self, operation: Operation, result: Result<(), Error>) -> bool {
        let ok = result.is_ok();
        self.push(operation, result.map(|_| None));
        ok
    }

    fn record_count(&mut self, operation: Operation, result: Result<u64, Error>) {
        self.push(operation, result.map(Some));
    }

    fn push(&mut self, operation: Operation, result: Result<Option<u64>, Error>) {
        let outcome = match result {
            Ok(value) => OperationOutcome {
                operation,
                status: OutcomeStatus::Ok,
                value,
                error: None,
                error_kind: None,
            },
            Err(err) => {
                warn!(%operation, error = %err, "engine operation failed");
                OperationOutcome {
                    operation,
                    status: OutcomeStatus::Failed,
                    value: None,
                    error: Some(err.to_string()),
                    error_kind: Some(err.kind()),
                }
            }
        };
        self.outcomes.push(outcome);
    }

    fn count_succeeded(&self, operation: Operation) -> bool {
        self.outcome(operation)
            .is_some_and(|outcome| outcome.status == OutcomeStatus::Ok)
    }

    pub fn outcome(&self, operation: Operation) -> Option<&OperationOutcome> {
        self.outcomes
            .iter()
            .find(|outcome| outcome.operation == operation)
    }

    pub fn failures(&self) -> impl Iterator<Item = &OperationOutcome> {
        self.outcomes
            .iter()
            .filter(|outcome| outcome.status == OutcomeStatus::Failed)
    }

    pub fn is_success(&self) -> bool {
        self.failures().next().is_none()
    }

    /// The five counts, when every counting operation succeeded.
    pub fn counts(&self) -> Option<SegmentCounts> {
        SegmentKind::ALL
            .into_iter()
            .all(|kind| self.count_succeeded(kind.operation()))
            .then_some(self.counts)
    }

    pub fn to_json(&self) -> Value {
        let outcomes = self
            .outcomes
            .iter()
            .map(|outcome| {
                let mut entry = Map::new();
                entry.insert("operation".to_string(), json!(outcome.operation.name()));
                entry.insert(
                    "status".to_string(),
                    json!(match outcome.status {
                        OutcomeStatus::Ok => "ok",
                        OutcomeStatus::Failed => "failed",
                    }),
                );
                if let Some(value) = outcome.value {
                    entry.insert("value".to_string(), json!(value));
                }
                if let Some(error) = &outcome.error {
                    entry.insert("error".to_string(), json!(error));
                }
                if let Some(kind) = outcome.error_kind {
                    entry.insert("kind".to_string(), json!(format!("{kind:?}")));
                }
                Value::Object(entry)
            })
            .collect::<Vec<_>>();

        let counts = self.counts().map(|counts| {
            let mut map = Map::new();
            for kind in SegmentKind::ALL {
                map.insert(kind.label().to_string(), json!(counts.get(kind)));
            }
            Value::Object(map)
        });

        json!({
            "input": self.input.display().to_string(),
            "outcomes": outcomes,
            "counts": counts,
            "artifacts": self
                .artifacts
                .iter()
                .map(|path| path.display().to_string())
                .collect::<Vec<_>>(),
        })
    }
}
