//! Batch orchestration: planning of decode tasks, bounded concurrent execution and merging of results.

use std::collections::HashSet;
use std::sync::Arc;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::archive;
use crate::assemble::{group_parts, ShapefileGroup};
use crate::context::DecodeContext;
use crate::detect::{detect, DetectedFormat};
use crate::error::{BatchError, ErrorKind, IngestError, ParseError};
use crate::input::RawInput;
use crate::layer::GisLayer;
use crate::normalize::normalize;
use crate::options::IngestOptions;
use crate::raster;
use crate::vector;

/// Result of a batch: every layer that could be built and every input that could not.
///
/// Both lists are ordered by the position of their source input in the batch.
#[derive(Debug, Clone, Default)]
pub struct ParseOutput {
    /// Decoded and normalized layers.
    pub layers: Vec<GisLayer>,
    /// Errors of the inputs that were excluded.
    pub errors: Vec<ParseError>,
}

/// Unit of work decoded independently of every other.
#[derive(Debug)]
pub(crate) enum DecodeTask {
    Single(RawInput, DetectedFormat),
    Shapefile(ShapefileGroup),
}

impl DecodeTask {
    fn name(&self) -> &str {
        match self {
            DecodeTask::Single(input, _) => input.name(),
            DecodeTask::Shapefile(group) => group.name(),
        }
    }
}

/// Layers and errors produced by one task.
#[derive(Debug, Default)]
pub(crate) struct TaskOutcome {
    pub(crate) layers: Vec<GisLayer>,
    pub(crate) errors: Vec<ParseError>,
}

impl TaskOutcome {
    pub(crate) fn failed(error: ParseError) -> Self {
        Self {
            layers: vec![],
            errors: vec![error],
        }
    }

    pub(crate) fn extend(&mut self, other: TaskOutcome) {
        self.layers.extend(other.layers);
        self.errors.extend(other.errors);
    }
}

/// Detects formats and groups shapefile components. Tasks are returned in the order of their first input.
pub(crate) fn plan(inputs: impl IntoIterator<Item = RawInput>) -> Vec<(usize, DecodeTask)> {
    let mut tasks = vec![];
    let mut parts = vec![];

    for (position, input) in inputs.into_iter().enumerate() {
        match detect(&input) {
            DetectedFormat::ShapefilePart(kind) => parts.push((position, kind, input)),
            format => tasks.push((position, DecodeTask::Single(input, format))),
        }
    }

    tasks.extend(
        group_parts(parts)
            .into_iter()
            .map(|group| (group.position, DecodeTask::Shapefile(group))),
    );
    tasks.sort_by_key(|(position, _)| *position);
    tasks
}

/// Decodes one task. Errors of the task become [`ParseError`]s.
///
/// Every layer of the outcome is normalized exactly once, as soon as it is built.
pub(crate) fn run_task(task: DecodeTask, ctx: &DecodeContext, in_archive: bool) -> TaskOutcome {
    let name = task.name().to_string();
    let result: Result<TaskOutcome, IngestError> = match task {
        DecodeTask::Shapefile(group) => match group.check_viable() {
            Ok(()) => vector::shapefile::decode(&group, ctx).and_then(single),
            Err(error) => return TaskOutcome::failed(error),
        },
        DecodeTask::Single(input, format) => match format {
            DetectedFormat::GeoJson => vector::geojson::decode(&input, ctx).and_then(single),
            DetectedFormat::Kml => vector::kml::decode(&input, ctx).and_then(single),
            DetectedFormat::GeoTiff => raster::geotiff::decode(&input, ctx).and_then(single),
            DetectedFormat::RasterImage => raster::image_file::decode(&input, ctx).and_then(single),
            DetectedFormat::Kmz | DetectedFormat::ZipArchive if in_archive => Err(
                IngestError::UnsupportedFormat("nested archives are not expanded".into()),
            ),
            DetectedFormat::Kmz => archive::decode_kmz(&input, ctx),
            DetectedFormat::ZipArchive if ctx.options().expand_zip_archives => {
                archive::decode_zip(&input, ctx)
            }
            DetectedFormat::ZipArchive => Err(IngestError::UnsupportedFormat(
                "zip archive extraction is disabled".into(),
            )),
            DetectedFormat::ShapefilePart(_) => Err(IngestError::UnsupportedFormat(
                "shapefile component outside of a group".into(),
            )),
            DetectedFormat::Unknown => Err(IngestError::UnsupportedFormat(
                "no decoder recognizes the file".into(),
            )),
        },
    };

    match result {
        Ok(outcome) => outcome,
        Err(error) => {
            log::warn!("Excluding {name}: {error}");
            TaskOutcome::failed(ParseError::from_error(name, &error))
        }
    }
}

fn single(mut layer: GisLayer) -> Result<TaskOutcome, IngestError> {
    normalize(&mut layer)?;
    Ok(TaskOutcome {
        layers: vec![layer],
        errors: vec![],
    })
}

/// Ingestion engine with fixed options.
///
/// ```ignore
/// let ingestor = Ingestor::new(IngestOptions::default().with_max_concurrency(2));
/// let output = ingestor.parse_files(inputs, &CancellationToken::new()).await?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct Ingestor {
    options: Arc<IngestOptions>,
}

impl Ingestor {
    /// Creates a new ingestor.
    pub fn new(options: IngestOptions) -> Self {
        Self {
            options: Arc::new(options),
        }
    }

    /// Options of the ingestor.
    pub fn options(&self) -> &IngestOptions {
        &self.options
    }

    /// Decodes and normalizes a batch of files.
    ///
    /// Every file (or shapefile group) is decoded on the blocking thread pool of the current tokio runtime, at most
    /// [`IngestOptions::concurrency`] at a time. Failure of one file never affects the others.
    ///
    /// Fails with [`BatchError::NoValidFiles`] if the batch is empty or no layer could be produced, and with
    /// [`BatchError::Cancelled`] if `cancel` fires before the batch completes.
    pub async fn parse_files(
        &self,
        inputs: Vec<RawInput>,
        cancel: &CancellationToken,
    ) -> Result<ParseOutput, BatchError> {
        if inputs.is_empty() {
            return Err(BatchError::NoValidFiles { errors: vec![] });
        }

        let input_count = inputs.len();
        let tasks = plan(inputs);
        let limit = self.options.concurrency();
        log::debug!("Decoding {input_count} inputs as {} tasks, {limit} at a time", tasks.len());

        let ctx = DecodeContext::new(self.options.clone(), cancel.clone());
        let outcomes = futures::stream::iter(tasks)
            .map(|(position, task)| {
                let ctx = ctx.clone();
                async move {
                    let name = task.name().to_string();
                    let outcome = tokio::task::spawn_blocking(move || run_task(task, &ctx, false))
                        .await
                        .unwrap_or_else(|err| {
                            log::error!("Decoder of {name} failed: {err}");
                            TaskOutcome::failed(ParseError::new(
                                name,
                                ErrorKind::Io,
                                format!("decoder failed unexpectedly: {err}"),
                            ))
                        });
                    (position, outcome)
                }
            })
            .buffer_unordered(limit)
            .collect::<Vec<_>>();

        let mut outcomes = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(BatchError::Cancelled),
            outcomes = outcomes => outcomes,
        };

        if cancel.is_cancelled() {
            return Err(BatchError::Cancelled);
        }

        outcomes.sort_by_key(|(position, _)| *position);
        let output = merge(outcomes.into_iter().map(|(_, outcome)| outcome));
        log::info!(
            "Batch of {input_count} inputs: {} layers, {} errors",
            output.layers.len(),
            output.errors.len()
        );

        if output.layers.is_empty() {
            return Err(BatchError::NoValidFiles {
                errors: output.errors,
            });
        }

        Ok(output)
    }
}

/// Concatenates task outcomes and assigns unique layer ids.
fn merge(outcomes: impl IntoIterator<Item = TaskOutcome>) -> ParseOutput {
    let mut output = ParseOutput::default();
    let mut ids = HashSet::new();

    for outcome in outcomes {
        for mut layer in outcome.layers {
            let base = slug(layer.name());
            let mut id = base.clone();
            let mut suffix = 2;
            while !ids.insert(id.clone()) {
                id = format!("{base}-{suffix}");
                suffix += 1;
            }
            layer.set_id(id);
            output.layers.push(layer);
        }
        output.errors.extend(outcome.errors);
    }

    output
}

/// Lowercase identifier made of alphanumerics separated by single dashes.
fn slug(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_alphanumeric() {
            slug.extend(c.to_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }

    let slug = slug.trim_end_matches('-');
    if slug.is_empty() {
        "layer".to_string()
    } else {
        slug.to_string()
    }
}

/// Decodes a batch with default options. See [`Ingestor::parse_files`].
pub async fn parse_files(inputs: Vec<RawInput>) -> Result<ParseOutput, BatchError> {
    Ingestor::default()
        .parse_files(inputs, &CancellationToken::new())
        .await
}

/// Decodes a batch with default options on a private tokio runtime.
///
/// Must not be called from within an async context.
pub fn parse_files_blocking(inputs: Vec<RawInput>) -> Result<ParseOutput, BatchError> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| BatchError::Runtime(err.to_string()))?;
    runtime.block_on(parse_files(inputs))
}
