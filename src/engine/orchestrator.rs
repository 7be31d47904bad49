// src/engine/orchestrator.rs
//
// Pipeline orchestrator: sequences geometry, map generation, compositing and
// assembly, tracks the run's state machine and owns every intermediate
// buffer in a per-run arena.

use crate::config::MockupConfig;
use crate::engine::assembler::assemble;
use crate::engine::buffer::{BufferArena, BufferHandle, ImageBuffer};
use crate::engine::common::run_with_panic_policy;
use crate::engine::compositor::composite_layers;
use crate::engine::geometry::warp;
use crate::engine::io::{AssetSource, RenderSink};
use crate::engine::maps::{generate_maps, MapSet};
use crate::engine::primitives::ImagingPrimitives;
use crate::error::{ErrorCategory, MockupError, Result};
use std::fmt;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, info_span, warn};

/// A unit of work in a mockup run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Loading the three assets from an `AssetSource`.
    Fetch,
    Geometry,
    Maps,
    Composite,
    Assemble,
    /// Handing the finished mockup to a `RenderSink`.
    Present,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Fetch => "fetch",
            Stage::Geometry => "geometry",
            Stage::Maps => "maps",
            Stage::Composite => "composite",
            Stage::Assemble => "assemble",
            Stage::Present => "present",
        }
    }

    /// Buffers the stage consumes, each paired with the stage producing it.
    fn inputs(self) -> &'static [(Stage, &'static str)] {
        match self {
            Stage::Fetch => &[],
            Stage::Geometry => &[(Stage::Fetch, "artwork"), (Stage::Fetch, "template")],
            Stage::Maps => &[(Stage::Fetch, "template"), (Stage::Fetch, "mask")],
            Stage::Composite => &[
                (Stage::Geometry, "warped"),
                (Stage::Maps, "displacement_map"),
                (Stage::Maps, "lighting_map"),
                (Stage::Maps, "adjustment_map"),
            ],
            Stage::Assemble => &[
                (Stage::Composite, "composited"),
                (Stage::Fetch, "template"),
                (Stage::Fetch, "mask"),
            ],
            Stage::Present => &[(Stage::Assemble, "mockup")],
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Orchestrator state machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PipelineState {
    Idle,
    RunningGeometry,
    RunningMaps,
    RunningComposite,
    RunningAssemble,
    Done,
    Failed,
}

impl PipelineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineState::Idle => "idle",
            PipelineState::RunningGeometry => "running_geometry",
            PipelineState::RunningMaps => "running_maps",
            PipelineState::RunningComposite => "running_composite",
            PipelineState::RunningAssemble => "running_assemble",
            PipelineState::Done => "done",
            PipelineState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Failed)
    }

    /// Forward steps in stage order, plus `Failed` from any non-terminal
    /// state. `Idle -> Failed` covers runs rejected before the first stage.
    pub fn can_transition_to(&self, next: PipelineState) -> bool {
        use PipelineState::*;
        match (*self, next) {
            (Idle, RunningGeometry)
            | (RunningGeometry, RunningMaps)
            | (RunningMaps, RunningComposite)
            | (RunningComposite, RunningAssemble)
            | (RunningAssemble, Done) => true,
            (from, Failed) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one stage.
#[derive(Clone, Debug, PartialEq)]
pub struct StageResult {
    pub stage: Stage,
    /// Buffers the stage stored in the run's arena, in production order.
    pub outputs: Vec<BufferHandle>,
    pub elapsed: Duration,
    /// Error text when the stage failed.
    pub diagnostics: Option<String>,
}

impl StageResult {
    pub fn failed(&self) -> bool {
        self.diagnostics.is_some()
    }
}

/// Everything observable about a run after the fact.
#[derive(Debug, Default)]
pub struct RunReport {
    pub states: Vec<PipelineState>,
    pub stages: Vec<StageResult>,
    pub total: Duration,
    /// Every intermediate buffer the run produced.
    pub arena: BufferArena,
}

impl RunReport {
    pub fn final_state(&self) -> Option<PipelineState> {
        self.states.last().copied()
    }

    pub fn stage(&self, stage: Stage) -> Option<&StageResult> {
        self.stages.iter().find(|r| r.stage == stage)
    }

    pub fn durations(&self) -> impl Iterator<Item = (Stage, Duration)> + '_ {
        self.stages.iter().map(|r| (r.stage, r.elapsed))
    }

    pub fn buffer(&self, handle: BufferHandle) -> Option<&ImageBuffer> {
        self.arena.get(handle)
    }
}

/// The three encoded inputs of a run.
#[derive(Clone, Debug)]
pub struct MockupInputs {
    pub template: ImageBuffer,
    pub mask: ImageBuffer,
    pub artwork: ImageBuffer,
}

impl MockupInputs {
    pub fn new(template: ImageBuffer, mask: ImageBuffer, artwork: ImageBuffer) -> Self {
        Self {
            template,
            mask,
            artwork,
        }
    }

    /// Wrap raw encoded bytes, reading only their headers.
    pub fn from_encoded(
        template: impl Into<Vec<u8>>,
        mask: impl Into<Vec<u8>>,
        artwork: impl Into<Vec<u8>>,
    ) -> Result<Self> {
        Ok(Self {
            template: ImageBuffer::from_encoded(template.into())?,
            mask: ImageBuffer::from_encoded(mask.into())?,
            artwork: ImageBuffer::from_encoded(artwork.into())?,
        })
    }
}

/// Identifiers of the three assets in an `AssetSource`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssetIds {
    pub template: String,
    pub mask: String,
    pub artwork: String,
}

impl AssetIds {
    pub fn new(
        template: impl Into<String>,
        mask: impl Into<String>,
        artwork: impl Into<String>,
    ) -> Self {
        Self {
            template: template.into(),
            mask: mask.into(),
            artwork: artwork.into(),
        }
    }
}

/// A finished mockup.
#[derive(Debug)]
pub struct MockupOutput {
    pub buffer: ImageBuffer,
    pub report: RunReport,
}

/// A run that ended in `Failed`, naming the first stage that failed.
#[derive(Debug, Error)]
#[error("mockup failed in {stage} stage: {error}")]
pub struct PipelineFailure {
    pub stage: Stage,
    #[source]
    pub error: MockupError,
    pub report: RunReport,
}

impl PipelineFailure {
    pub fn category(&self) -> ErrorCategory {
        self.error.category()
    }
}

type StageOutcome<T> = std::result::Result<T, (Stage, MockupError)>;

trait AtStage<T> {
    fn at(self, stage: Stage) -> StageOutcome<T>;
}

impl<T> AtStage<T> for Result<T> {
    fn at(self, stage: Stage) -> StageOutcome<T> {
        self.map_err(|e| (stage, e))
    }
}

fn millis(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

fn timed<T>(label: &'static str, f: impl FnOnce() -> Result<T>) -> (Result<T>, Duration) {
    let start = Instant::now();
    let result = run_with_panic_policy(label, f);
    (result, start.elapsed())
}

fn store_warped(arena: &mut BufferArena, warped: ImageBuffer) -> Vec<BufferHandle> {
    vec![arena.insert("warped", warped)]
}

fn store_maps(arena: &mut BufferArena, maps: MapSet) -> Vec<BufferHandle> {
    vec![
        arena.insert("displacement_map", maps.displacement),
        arena.insert("lighting_map", maps.lighting),
        arena.insert("adjustment_map", maps.adjustment),
    ]
}

/// Mutable bookkeeping of a single run.
struct Run {
    state: PipelineState,
    started: Instant,
    report: RunReport,
}

impl Run {
    fn new() -> Self {
        Self {
            state: PipelineState::Idle,
            started: Instant::now(),
            report: RunReport {
                states: vec![PipelineState::Idle],
                ..RunReport::default()
            },
        }
    }

    fn enter(&mut self, next: PipelineState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(MockupError::invalid_transition(
                self.state.as_str(),
                next.as_str(),
            ));
        }
        debug!(target: "mockup_engine::pipeline", from = %self.state, to = %next, "transition");
        self.state = next;
        self.report.states.push(next);
        Ok(())
    }

    fn record(
        &mut self,
        stage: Stage,
        outputs: Vec<BufferHandle>,
        elapsed: Duration,
        diagnostics: Option<String>,
    ) {
        self.report.stages.push(StageResult {
            stage,
            outputs,
            elapsed,
            diagnostics,
        });
    }

    fn settle<T>(
        &mut self,
        stage: Stage,
        outcome: Result<T>,
        elapsed: Duration,
        store: impl FnOnce(&mut BufferArena, T) -> Vec<BufferHandle>,
    ) -> StageOutcome<Vec<BufferHandle>> {
        match outcome {
            Ok(value) => {
                let outputs = store(&mut self.report.arena, value);
                info!(
                    target: "mockup_engine::pipeline",
                    %stage,
                    elapsed_ms = millis(elapsed),
                    buffers = outputs.len(),
                    "stage complete"
                );
                self.record(stage, outputs.clone(), elapsed, None);
                Ok(outputs)
            }
            Err(error) => {
                self.record(stage, Vec::new(), elapsed, Some(error.to_string()));
                Err((stage, error))
            }
        }
    }

    /// Fetch a stage input from the arena.
    fn require(
        &self,
        stage: Stage,
        handles: &[BufferHandle],
        index: usize,
        dependency: &'static str,
    ) -> StageOutcome<ImageBuffer> {
        handles
            .get(index)
            .and_then(|h| self.report.arena.get(*h))
            .cloned()
            .ok_or_else(|| (stage, MockupError::missing_dependency(stage.as_str(), dependency)))
    }

    /// Record every imaging stage whose input was never produced as failed,
    /// naming the first missing input.
    fn skip_downstream(&mut self) {
        for stage in [Stage::Geometry, Stage::Maps, Stage::Composite, Stage::Assemble] {
            if self.report.stage(stage).is_some() {
                continue;
            }
            let missing = stage
                .inputs()
                .iter()
                .find(|(producer, _)| self.report.stage(*producer).is_some_and(StageResult::failed));
            if let Some(&(_, dependency)) = missing {
                let error = MockupError::missing_dependency(stage.as_str(), dependency);
                debug!(target: "mockup_engine::pipeline", %stage, dependency, "stage skipped");
                self.record(stage, Vec::new(), Duration::ZERO, Some(error.to_string()));
            }
        }
    }

    fn finish(mut self) -> RunReport {
        self.report.total = self.started.elapsed();
        self.report
    }

    fn fail(mut self, stage: Stage, error: MockupError) -> PipelineFailure {
        if self.report.stage(stage).is_none() {
            self.record(stage, Vec::new(), Duration::ZERO, Some(error.to_string()));
        }
        self.skip_downstream();
        if self.state.can_transition_to(PipelineState::Failed) {
            self.state = PipelineState::Failed;
            self.report.states.push(PipelineState::Failed);
        }
        warn!(
            target: "mockup_engine::pipeline",
            %stage,
            category = error.category().as_str(),
            %error,
            "mockup run failed"
        );
        PipelineFailure {
            stage,
            error,
            report: self.finish(),
        }
    }
}

fn fetch_inputs<S>(source: &S, ids: &AssetIds) -> Result<MockupInputs>
where
    S: AssetSource + ?Sized,
{
    // All bytes are fetched before any header is looked at.
    let template = source.fetch_bytes(&ids.template)?;
    let mask = source.fetch_bytes(&ids.mask)?;
    let artwork = source.fetch_bytes(&ids.artwork)?;
    MockupInputs::from_encoded(template, mask, artwork)
}

/// Renders mockups with an injected set of imaging primitives.
#[derive(Debug)]
pub struct MockupPipeline<P> {
    primitives: P,
    config: MockupConfig,
}

impl<P: ImagingPrimitives> MockupPipeline<P> {
    /// Fails when `config` is invalid; nothing else is checked up front.
    pub fn new(primitives: P, config: MockupConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { primitives, config })
    }

    pub fn primitives(&self) -> &P {
        &self.primitives
    }

    pub fn config(&self) -> &MockupConfig {
        &self.config
    }

    /// Render one mockup from in-memory inputs.
    pub fn run(&self, inputs: &MockupInputs) -> std::result::Result<MockupOutput, PipelineFailure> {
        self.run_tracked(Run::new(), inputs)
    }

    /// Fetch the three assets, then render. A failed fetch ends the run
    /// before any imaging work starts.
    pub fn run_from_source<S>(
        &self,
        source: &S,
        ids: &AssetIds,
    ) -> std::result::Result<MockupOutput, PipelineFailure>
    where
        S: AssetSource + ?Sized,
    {
        let mut run = Run::new();
        let start = Instant::now();
        let inputs = match fetch_inputs(source, ids) {
            Ok(inputs) => inputs,
            Err(error) => return Err(run.fail(Stage::Fetch, error)),
        };
        run.record(Stage::Fetch, Vec::new(), start.elapsed(), None);
        self.run_tracked(run, &inputs)
    }

    /// Fetch, render and hand the result to `sink`.
    pub fn render_to<S, K>(
        &self,
        source: &S,
        ids: &AssetIds,
        sink: &K,
    ) -> std::result::Result<MockupOutput, PipelineFailure>
    where
        S: AssetSource + ?Sized,
        K: RenderSink + ?Sized,
    {
        let MockupOutput { buffer, mut report } = self.run_from_source(source, ids)?;
        let start = Instant::now();
        let presented = sink.present(&buffer);
        let elapsed = start.elapsed();
        match presented {
            Ok(()) => {
                report.stages.push(StageResult {
                    stage: Stage::Present,
                    outputs: Vec::new(),
                    elapsed,
                    diagnostics: None,
                });
                Ok(MockupOutput { buffer, report })
            }
            Err(error) => {
                warn!(target: "mockup_engine::pipeline", %error, "sink rejected mockup");
                report.stages.push(StageResult {
                    stage: Stage::Present,
                    outputs: Vec::new(),
                    elapsed,
                    diagnostics: Some(error.to_string()),
                });
                Err(PipelineFailure {
                    stage: Stage::Present,
                    error,
                    report,
                })
            }
        }
    }

    fn run_tracked(
        &self,
        mut run: Run,
        inputs: &MockupInputs,
    ) -> std::result::Result<MockupOutput, PipelineFailure> {
        let span = info_span!(
            target: "mockup_engine::pipeline",
            "mockup_run",
            parallel = self.config.parallel
        );
        let _guard = span.enter();

        match self.execute(&mut run, inputs) {
            Ok(buffer) => {
                let report = run.finish();
                info!(
                    target: "mockup_engine::pipeline",
                    total_ms = millis(report.total),
                    bytes = buffer.len(),
                    width = buffer.width(),
                    height = buffer.height(),
                    "mockup rendered"
                );
                Ok(MockupOutput { buffer, report })
            }
            Err((stage, error)) => Err(run.fail(stage, error)),
        }
    }

    fn execute(&self, run: &mut Run, inputs: &MockupInputs) -> StageOutcome<ImageBuffer> {
        let p = &self.primitives;
        let config = &self.config;

        run.enter(PipelineState::RunningGeometry).at(Stage::Geometry)?;
        let template_dims = p.dimensions(inputs.template.bytes()).at(Stage::Geometry)?;
        debug!(target: "mockup_engine::pipeline", template = %template_dims, "template probed");

        let geometry = || {
            timed("stage:geometry", || {
                warp(p, &inputs.artwork, template_dims, config)
            })
        };
        let maps = || {
            timed("stage:maps", || {
                generate_maps(p, &inputs.template, &inputs.mask, &config.blend)
            })
        };
        let (warped, maps) = if config.parallel {
            let ((warped, geometry_time), (maps, maps_time)) = rayon::join(geometry, maps);
            // Both branches are recorded; geometry's error wins and the run
            // fails from RunningGeometry.
            match run.settle(Stage::Geometry, warped, geometry_time, store_warped) {
                Err(failure) => {
                    run.settle(Stage::Maps, maps, maps_time, store_maps).ok();
                    return Err(failure);
                }
                Ok(warped) => {
                    run.enter(PipelineState::RunningMaps).at(Stage::Maps)?;
                    (warped, run.settle(Stage::Maps, maps, maps_time, store_maps)?)
                }
            }
        } else {
            let (warped, elapsed) = geometry();
            let warped = run.settle(Stage::Geometry, warped, elapsed, store_warped)?;
            run.enter(PipelineState::RunningMaps).at(Stage::Maps)?;
            let (maps, elapsed) = maps();
            (warped, run.settle(Stage::Maps, maps, elapsed, store_maps)?)
        };

        run.enter(PipelineState::RunningComposite).at(Stage::Composite)?;
        let warped = run.require(Stage::Composite, &warped, 0, "warped")?;
        let map_set = MapSet {
            displacement: run.require(Stage::Composite, &maps, 0, "displacement_map")?,
            lighting: run.require(Stage::Composite, &maps, 1, "lighting_map")?,
            adjustment: run.require(Stage::Composite, &maps, 2, "adjustment_map")?,
        };
        let (composited, elapsed) = timed("stage:composite", || {
            composite_layers(p, &warped, &map_set, &config.blend)
        });
        let composited = run.settle(Stage::Composite, composited, elapsed, |arena, buffer| {
            vec![arena.insert("composited", buffer)]
        })?;

        run.enter(PipelineState::RunningAssemble).at(Stage::Assemble)?;
        let composited = run.require(Stage::Assemble, &composited, 0, "composited")?;
        let (mockup, elapsed) = timed("stage:assemble", || {
            assemble(
                p,
                &inputs.template,
                &composited,
                &inputs.mask,
                config.output_format,
            )
        });
        let mockup = run.settle(Stage::Assemble, mockup, elapsed, |arena, buffer| {
            vec![arena.insert("mockup", buffer)]
        })?;
        let mockup = run.require(Stage::Assemble, &mockup, 0, "mockup")?;

        run.enter(PipelineState::Done).at(Stage::Assemble)?;
        Ok(mockup)
    }
}
