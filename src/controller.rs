//! Phase state machine driving preview, final, crossfade and energy output.
//!
//! The host feeds inputs as they arrive and calls [`RenderController::tick`]
//! once per display refresh. All work for a tick happens inside that call.

use std::collections::HashMap;

use log::{debug, info, warn};
use tiny_skia::{Color, Pixmap};

use crate::compositor::{blit, crossfade, Compositor, EnergyOverlay, PreviewBuilder};
use crate::config::RenderConfig;
use crate::energy::{EnergyArena, ResolutionFingerprint};
use crate::error::MosaicError;
use crate::mask::{dilate, AlphaMask};
use crate::pixels::new_pixmap;
use crate::plan::Plan;
use crate::regions::{Region, RegionSet, ShapeKind};
use crate::scheduler::{CancelToken, LoopKind, Scheduler};
use crate::shapes::{ShapeLibrary, ShapeSource};
use crate::text::TextPainter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Empty,
    Preview,
    Final,
    Energy,
    Failed,
}

impl Phase {
    pub fn name(self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Preview => "preview",
            Self::Final => "final",
            Self::Energy => "energy",
            Self::Failed => "failed",
        }
    }
}

/// Which buffer the surface currently shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shown {
    Nothing,
    Preview,
    Crossfade,
    Final,
    Energy,
}

/// Why the energy loop is not running while Final is up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EnergyStop {
    /// Reduced motion: one frame rendered and held.
    Held,
    /// The host cancelled the energy token.
    Cancelled,
}

struct PreviewState {
    plan_id: u64,
    plan: Plan,
    builder: Option<PreviewBuilder>,
}

struct FinalState {
    plan_id: u64,
    shapes_generation: u64,
    energy_planned: bool,
    detail_level: u8,
    frame: Pixmap,
    energy_outline: Option<AlphaMask>,
    region_counts: HashMap<Region, usize>,
    static_outline: bool,
}

pub struct RenderController {
    config: RenderConfig,
    compositor: Compositor,
    shapes: ShapeLibrary,
    scheduler: Scheduler,
    phase: Phase,
    population: u64,
    reduced_motion: bool,
    clock_ms: u64,
    next_plan_id: u64,
    preview: Option<PreviewState>,
    preview_batches: usize,
    final_plan: Option<(u64, Plan)>,
    final_state: Option<FinalState>,
    crossfade_from: Option<Pixmap>,
    crossfade_frame: Option<Pixmap>,
    arena: Option<EnergyArena>,
    overlay: EnergyOverlay,
    energy_frame: Option<Pixmap>,
    energy_frames: u64,
    energy_stop: Option<EnergyStop>,
    surface: Pixmap,
    shown: Shown,
    error: Option<MosaicError>,
}

impl RenderController {
    pub fn new(config: RenderConfig) -> Result<Self, MosaicError> {
        config.validate()?;
        let painter = TextPainter::from_font_path(config.font.path.as_deref())?;
        Self::with_painter(config, painter)
    }

    pub fn with_painter(config: RenderConfig, painter: TextPainter) -> Result<Self, MosaicError> {
        let surface = new_pixmap(config.phases.surface_width, config.phases.surface_height)?;
        Ok(Self {
            reduced_motion: config.phases.reduced_motion,
            compositor: Compositor::with_painter(config.clone(), painter),
            config,
            shapes: ShapeLibrary::new(),
            scheduler: Scheduler::new(),
            phase: Phase::Empty,
            population: 0,
            clock_ms: 0,
            next_plan_id: 1,
            preview: None,
            preview_batches: 0,
            final_plan: None,
            final_state: None,
            crossfade_from: None,
            crossfade_frame: None,
            arena: None,
            overlay: EnergyOverlay::new(),
            energy_frame: None,
            energy_frames: 0,
            energy_stop: None,
            surface,
            shown: Shown::Nothing,
            error: None,
        })
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn preview_ready(&self) -> bool {
        self.preview_batches > 0
    }

    pub fn final_ready(&self) -> bool {
        self.final_state.is_some()
    }

    pub fn surface(&self) -> &Pixmap {
        &self.surface
    }

    pub fn energy_frames_rendered(&self) -> u64 {
        self.energy_frames
    }

    pub fn error(&self) -> Option<&MosaicError> {
        self.error.as_ref()
    }

    pub fn population(&self) -> u64 {
        self.population
    }

    pub fn shapes(&self) -> &ShapeLibrary {
        &self.shapes
    }

    /// Preview batches drawn so far, across all preview plans.
    pub fn preview_batches(&self) -> usize {
        self.preview_batches
    }

    pub fn is_crossfading(&self) -> bool {
        self.scheduler.is_active(LoopKind::Crossfade)
    }

    pub fn energy_running(&self) -> bool {
        self.scheduler.is_active(LoopKind::Energy)
    }

    /// Handle for stopping the energy loop from outside the controller.
    pub fn energy_token(&self) -> Option<CancelToken> {
        self.scheduler.token(LoopKind::Energy)
    }

    /// The Plan-resolution frame behind the surface.
    pub fn displayed_frame(&self) -> Option<&Pixmap> {
        match self.shown {
            Shown::Nothing => None,
            Shown::Preview => self
                .preview
                .as_ref()
                .and_then(|state| state.builder.as_ref())
                .map(PreviewBuilder::frame),
            Shown::Crossfade => self.crossfade_frame.as_ref(),
            Shown::Final => self.final_state.as_ref().map(|state| &state.frame),
            Shown::Energy => self.energy_frame.as_ref(),
        }
    }

    pub fn final_frame(&self) -> Option<&Pixmap> {
        self.final_state.as_ref().map(|state| &state.frame)
    }

    pub fn final_region_counts(&self) -> Option<&HashMap<Region, usize>> {
        self.final_state.as_ref().map(|state| &state.region_counts)
    }

    /// Whether the Final frame carries the static outline glow.
    pub fn final_has_static_outline(&self) -> Option<bool> {
        self.final_state.as_ref().map(|state| state.static_outline)
    }

    fn energy_planned(&self) -> bool {
        self.population >= self.config.energy.activation_threshold
    }

    fn set_phase(&mut self, phase: Phase) {
        if self.phase != phase {
            info!("phase {} -> {}", self.phase.name(), phase.name());
            self.phase = phase;
        }
    }

    fn take_plan_id(&mut self) -> u64 {
        let id = self.next_plan_id;
        self.next_plan_id += 1;
        id
    }

    /// Queue a low-fidelity preview. Returns the plan id, or `None` when the
    /// preview arrives after the final plan and is dropped.
    pub fn submit_preview(&mut self, plan: Plan) -> Result<Option<u64>, MosaicError> {
        plan.validate()?;
        if self.phase == Phase::Failed {
            return Err(MosaicError::Session("controller has failed".into()));
        }
        if self.final_plan.is_some() {
            info!("preview plan ignored: final plan already submitted");
            return Ok(None);
        }
        let plan_id = self.take_plan_id();
        debug!(
            "preview plan {plan_id}: {}x{}, {} tiles",
            plan.width,
            plan.height,
            plan.text_tile_count()
        );
        self.preview = Some(PreviewState {
            plan_id,
            plan,
            builder: None,
        });
        self.scheduler.start(LoopKind::PreviewBatch, self.clock_ms);
        self.set_phase(Phase::Preview);
        Ok(Some(plan_id))
    }

    /// Replace the final plan. Composition happens on the next tick once
    /// every required shape is resolved.
    pub fn submit_final(&mut self, plan: Plan) -> Result<u64, MosaicError> {
        plan.validate()?;
        if self.phase == Phase::Failed {
            return Err(MosaicError::Session("controller has failed".into()));
        }
        let plan_id = self.take_plan_id();
        info!(
            "final plan {plan_id}: {}x{}, {} tiles, {} subscribers",
            plan.width,
            plan.height,
            plan.text_tile_count(),
            plan.subscriber_count
        );
        self.stop_energy();
        self.final_plan = Some((plan_id, plan));
        Ok(plan_id)
    }

    pub fn provide_shape(&mut self, kind: ShapeKind, source: ShapeSource) {
        if source.is_missing() {
            warn!("shape {kind} missing, continuing without it");
        } else {
            debug!("shape {kind} resolved");
        }
        self.shapes.insert(kind, source);
        if self.final_state.is_some() {
            self.stop_energy();
        }
    }

    pub fn set_population(&mut self, population: u64) {
        if population != self.population {
            debug!("population {} -> {}", self.population, population);
        }
        self.population = population;
    }

    pub fn set_reduced_motion(&mut self, reduced_motion: bool) {
        if !reduced_motion && self.energy_stop == Some(EnergyStop::Held) {
            self.energy_stop = None;
        }
        self.reduced_motion = reduced_motion;
    }

    /// Re-fit the current buffer into a new surface size.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), MosaicError> {
        self.surface = new_pixmap(width, height)?;
        self.reblit();
        Ok(())
    }

    /// Halt every loop and show the error backdrop.
    pub fn fail(&mut self, error: MosaicError) {
        warn!("render session failed: {error}");
        self.scheduler.cancel_all();
        self.preview = None;
        self.final_plan = None;
        self.crossfade_from = None;
        self.crossfade_frame = None;
        self.energy_frame = None;
        self.shown = Shown::Nothing;
        self.error = Some(error);
        self.set_phase(Phase::Failed);
        self.reblit();
    }

    pub fn tick(&mut self, now_ms: u64) {
        if self.phase == Phase::Failed {
            return;
        }
        self.clock_ms = now_ms;
        if self.scheduler.reap().contains(&LoopKind::Energy) {
            self.energy_stop = Some(EnergyStop::Cancelled);
            if self.phase == Phase::Energy {
                self.set_phase(Phase::Final);
            }
        }
        if let Err(error) = self.step(now_ms) {
            self.fail(error);
        }
    }

    fn step(&mut self, now_ms: u64) -> Result<(), MosaicError> {
        self.compose_final_if_ready(now_ms)?;
        self.advance_preview()?;
        self.advance_crossfade(now_ms);
        self.advance_energy(now_ms)
    }

    fn stop_energy(&mut self) {
        self.scheduler.cancel(LoopKind::Energy);
        self.energy_frame = None;
        self.energy_stop = None;
        if self.phase == Phase::Energy {
            self.set_phase(Phase::Final);
        }
        if self.shown == Shown::Energy && self.final_state.is_some() {
            self.shown = Shown::Final;
            self.reblit();
        }
    }

    fn compose_final_if_ready(&mut self, now_ms: u64) -> Result<(), MosaicError> {
        let energy_planned = self.energy_planned();
        let detail_level = self.compositor.detail_level(self.population);
        let generation = self.shapes.generation();
        let Some((plan_id, plan)) = &self.final_plan else {
            return Ok(());
        };
        let plan_id = *plan_id;
        if let Some(state) = &self.final_state {
            if state.plan_id == plan_id
                && state.shapes_generation == generation
                && state.energy_planned == energy_planned
                && state.detail_level == detail_level
            {
                return Ok(());
            }
        }
        let Some(masks) = self.shapes.masks_for(plan.width, plan.height, &self.config.masks)
        else {
            debug!("final plan {plan_id} waiting on {:?}", self.shapes.pending());
            return Ok(());
        };
        let regions = RegionSet::build(masks.clone(), self.config.masks.eye_dilation);
        if !regions.headband_active() {
            debug!("headband inactive for plan {plan_id}");
        }
        let composite =
            self.compositor
                .compose_final(plan, &regions, self.population, energy_planned)?;
        let energy_outline =
            energy_planned.then(|| dilate(&regions.outline, self.config.masks.outline_dilation));

        let replacing = self.final_state.is_some();
        self.scheduler.cancel(LoopKind::Energy);
        self.energy_frame = None;
        self.energy_stop = None;
        self.final_state = Some(FinalState {
            plan_id,
            shapes_generation: generation,
            energy_planned,
            detail_level,
            frame: composite.frame,
            energy_outline,
            region_counts: composite.region_counts,
            static_outline: composite.static_outline,
        });

        self.scheduler.cancel(LoopKind::PreviewBatch);
        let preview_frame = self
            .preview
            .take()
            .and_then(|state| state.builder)
            .map(PreviewBuilder::into_frame);
        match preview_frame {
            Some(from) if !replacing => {
                self.crossfade_from = Some(from);
                self.crossfade_frame = None;
                self.scheduler.start(LoopKind::Crossfade, now_ms);
            }
            // Final swapped mid-fade; the fade continues toward the new frame.
            _ if self.scheduler.is_active(LoopKind::Crossfade) => {}
            _ => {
                self.shown = Shown::Final;
                self.reblit();
            }
        }
        self.set_phase(Phase::Final);
        Ok(())
    }

    fn advance_preview(&mut self) -> Result<(), MosaicError> {
        if !self.scheduler.is_active(LoopKind::PreviewBatch) {
            return Ok(());
        }
        let Some(state) = self.preview.as_mut() else {
            self.scheduler.finish(LoopKind::PreviewBatch);
            return Ok(());
        };
        if state.builder.is_none() {
            let (width, height) = (state.plan.width, state.plan.height);
            let threshold = self.config.masks.threshold;
            let silhouette = self.shapes.mask(ShapeKind::Silhouette, width, height, threshold);
            let outline = self.shapes.mask(ShapeKind::Outline, width, height, threshold);
            let (Some(silhouette), Some(outline)) = (silhouette, outline) else {
                return Ok(());
            };
            state.builder = Some(
                self.compositor
                    .preview_builder(&state.plan, silhouette, &outline)?,
            );
        }
        let Some(builder) = state.builder.as_mut() else {
            return Ok(());
        };

        let phases = &self.config.phases;
        let batch = phases
            .preview_batch_min
            .max(state.plan.text_tile_count() / phases.preview_batch_divisor);
        let drawn = builder.draw_batch(&mut self.compositor, &state.plan, batch);
        if drawn > 0 {
            self.preview_batches += 1;
            debug!(
                "preview plan {}: batch of {drawn}, {} drawn",
                state.plan_id,
                builder.drawn()
            );
        }
        if self.shown == Shown::Nothing || drawn > 0 {
            blit(&mut self.surface, builder.frame());
            self.shown = Shown::Preview;
        }
        if builder.is_complete(&state.plan) {
            debug!("preview plan {} complete", state.plan_id);
            self.scheduler.finish(LoopKind::PreviewBatch);
        }
        Ok(())
    }

    fn advance_crossfade(&mut self, now_ms: u64) {
        let Some(started) = self.scheduler.started_ms(LoopKind::Crossfade) else {
            return;
        };
        let (Some(from), Some(state)) = (&self.crossfade_from, &self.final_state) else {
            self.scheduler.finish(LoopKind::Crossfade);
            return;
        };
        let duration = self.config.phases.crossfade_ms.max(1);
        let t = now_ms.saturating_sub(started) as f32 / duration as f32;
        if t >= 1.0 {
            self.scheduler.finish(LoopKind::Crossfade);
            self.crossfade_from = None;
            self.crossfade_frame = None;
            self.shown = Shown::Final;
            self.reblit();
            debug!("crossfade complete, preview released");
            return;
        }
        let out = self.crossfade_frame.get_or_insert_with(|| from.clone());
        crossfade(out, from, &state.frame, t);
        blit(&mut self.surface, out);
        self.shown = Shown::Crossfade;
    }

    fn advance_energy(&mut self, now_ms: u64) -> Result<(), MosaicError> {
        let Some(state) = &self.final_state else {
            return Ok(());
        };
        let Some(outline) = &state.energy_outline else {
            return Ok(());
        };
        if self.scheduler.is_active(LoopKind::Crossfade) {
            return Ok(());
        }
        if !self.scheduler.is_active(LoopKind::Energy) {
            if self.energy_stop.is_some() {
                return Ok(());
            }
            self.scheduler.start(LoopKind::Energy, now_ms);
            if self.phase != Phase::Energy {
                info!("phase {} -> energy", self.phase.name());
                self.phase = Phase::Energy;
            }
        }

        let started = self.scheduler.started_ms(LoopKind::Energy).unwrap_or(now_ms);
        let t_seconds = now_ms.saturating_sub(started) as f64 / 1000.0;
        let fingerprint = ResolutionFingerprint {
            full_width: state.frame.width(),
            full_height: state.frame.height(),
            working_cap: self.config.energy.working_cap,
        };
        if self.arena.is_none() {
            self.arena = Some(EnergyArena::new(fingerprint)?);
        }
        let Some(arena) = self.arena.as_mut() else {
            return Ok(());
        };
        arena.reconfigure(fingerprint)?;
        let energy = &self.config.energy;
        let buffer = arena.render(outline, t_seconds, &energy.turbulence, &energy.mask);
        let frame = self
            .energy_frame
            .get_or_insert_with(|| state.frame.clone());
        self.overlay.render(
            frame,
            &state.frame,
            buffer,
            self.config.palette.energy_tint,
            energy.bloom_opacity,
            energy.core_opacity,
        )?;
        blit(&mut self.surface, frame);
        self.shown = Shown::Energy;
        self.energy_frames += 1;

        if self.reduced_motion {
            debug!("reduced motion: energy held after one frame");
            self.scheduler.finish(LoopKind::Energy);
            self.energy_stop = Some(EnergyStop::Held);
        }
        Ok(())
    }

    fn reblit(&mut self) {
        if self.phase == Phase::Failed {
            let [r, g, b] = self.config.palette.error_backdrop;
            self.surface.fill(Color::from_rgba8(r, g, b, 255));
            return;
        }
        let frame = match self.shown {
            Shown::Nothing => None,
            Shown::Preview => self
                .preview
                .as_ref()
                .and_then(|state| state.builder.as_ref())
                .map(PreviewBuilder::frame),
            Shown::Crossfade => self.crossfade_frame.as_ref(),
            Shown::Final => self.final_state.as_ref().map(|state| &state.frame),
            Shown::Energy => self.energy_frame.as_ref(),
        };
        match frame {
            Some(frame) => blit(&mut self.surface, frame),
            None => self.surface.fill(Color::TRANSPARENT),
        }
    }
}

#[cfg(test)]
mod tests {
    use image::{DynamicImage, Luma, Rgba, RgbaImage};

    use super::*;
    use crate::plan::Tile;

    const SIZE: u32 = 48;

    fn shape(fill: impl Fn(u32, u32) -> bool) -> ShapeSource {
        let image = image::ImageBuffer::from_fn(SIZE, SIZE, |x, y| {
            Luma([if fill(x, y) { 255u8 } else { 0 }])
        });
        ShapeSource::Image(DynamicImage::ImageLuma8(image))
    }

    fn rect(x0: u32, y0: u32, x1: u32, y1: u32) -> impl Fn(u32, u32) -> bool {
        move |x, y| (x0..x1).contains(&x) && (y0..y1).contains(&y)
    }

    fn provide_all(controller: &mut RenderController) {
        controller.provide_shape(ShapeKind::Silhouette, shape(rect(6, 6, 42, 42)));
        controller.provide_shape(ShapeKind::Hair, shape(rect(0, 6, SIZE, 12)));
        controller.provide_shape(ShapeKind::Beak, shape(rect(20, 20, 28, 26)));
        controller.provide_shape(ShapeKind::Feet, shape(rect(0, 38, SIZE, 42)));
        controller.provide_shape(ShapeKind::Eyes, shape(rect(14, 14, 18, 18)));
        controller.provide_shape(ShapeKind::Pupils, shape(rect(16, 16, 17, 17)));
        controller.provide_shape(ShapeKind::Nostrils, shape(|_, _| false));
        let (outer, inner) = (rect(4, 4, 44, 44), rect(6, 6, 42, 42));
        controller.provide_shape(ShapeKind::Outline, shape(move |x, y| outer(x, y) && !inner(x, y)));
        let clear = RgbaImage::from_pixel(SIZE, SIZE, Rgba([0, 0, 0, 0]));
        controller.provide_shape(
            ShapeKind::Headband,
            ShapeSource::Image(DynamicImage::ImageRgba8(clear)),
        );
    }

    fn plan(tiles: usize, is_preview: bool) -> Plan {
        Plan {
            width: SIZE,
            height: SIZE,
            items: (0..tiles)
                .map(|i| Tile {
                    kind: "text".into(),
                    text: "ab".into(),
                    full_text: "ab".into(),
                    x: 8.0 + (i % 30) as f32,
                    y: 8.0 + (i / 30 % 30) as f32,
                    size: 4.0,
                    color: Some("#44ccff".into()),
                })
                .collect(),
            subscriber_count: tiles as u64,
            is_preview,
            names_requested: tiles as u64,
            names_placed: tiles as u64,
        }
    }

    fn controller() -> RenderController {
        let mut config = RenderConfig::default();
        config.phases.surface_width = 64;
        config.phases.surface_height = 64;
        RenderController::with_painter(config, TextPainter::Blocks).expect("controller")
    }

    #[test]
    fn starts_empty() {
        let controller = controller();
        assert_eq!(controller.phase(), Phase::Empty);
        assert!(!controller.preview_ready());
        assert!(!controller.final_ready());
        assert!(controller.error().is_none());
    }

    #[test]
    fn preview_draws_in_batches_of_at_least_120() {
        let mut controller = controller();
        provide_all(&mut controller);
        controller.submit_preview(plan(300, true)).expect("preview");
        controller.tick(0);
        assert_eq!(controller.phase(), Phase::Preview);
        assert!(controller.preview_ready());
        controller.tick(16);
        controller.tick(32);
        assert_eq!(controller.preview_batches(), 3);
        controller.tick(48);
        assert_eq!(controller.preview_batches(), 3, "300 tiles fit in three batches");
    }

    #[test]
    fn final_waits_for_required_shapes() {
        let mut controller = controller();
        controller.submit_final(plan(10, false)).expect("final");
        controller.tick(0);
        assert!(!controller.final_ready());
        provide_all(&mut controller);
        controller.tick(16);
        assert!(controller.final_ready());
        assert_eq!(controller.phase(), Phase::Final);
    }

    #[test]
    fn preview_after_final_is_ignored() {
        let mut controller = controller();
        provide_all(&mut controller);
        controller.submit_final(plan(10, false)).expect("final");
        controller.tick(0);
        let accepted = controller.submit_preview(plan(10, true)).expect("preview");
        assert_eq!(accepted, None);
        controller.tick(16);
        assert_eq!(controller.phase(), Phase::Final);
        assert_eq!(controller.preview_batches(), 0);
    }

    #[test]
    fn crossfade_runs_from_preview_to_final() {
        let mut controller = controller();
        provide_all(&mut controller);
        controller.submit_preview(plan(40, true)).expect("preview");
        controller.tick(0);
        let preview = controller.displayed_frame().expect("preview frame").clone();

        controller.submit_final(plan(40, false)).expect("final");
        controller.tick(100);
        assert!(controller.is_crossfading());
        assert_eq!(controller.displayed_frame().expect("fade").data(), preview.data());

        controller.tick(100 + 380);
        assert!(!controller.is_crossfading());
        let final_frame = controller.final_frame().expect("final").data().to_vec();
        assert_eq!(controller.displayed_frame().expect("final").data(), &final_frame[..]);
    }

    #[test]
    fn energy_below_threshold_never_starts() {
        let mut controller = controller();
        provide_all(&mut controller);
        controller.set_population(500);
        controller.submit_final(plan(10, false)).expect("final");
        for frame in 0..5 {
            controller.tick(frame * 16);
        }
        assert_eq!(controller.phase(), Phase::Final);
        assert_eq!(controller.energy_frames_rendered(), 0);
        assert_eq!(controller.final_has_static_outline(), Some(true));
    }

    #[test]
    fn energy_loops_above_threshold() {
        let mut controller = controller();
        provide_all(&mut controller);
        controller.set_population(4000);
        controller.submit_final(plan(10, false)).expect("final");
        for frame in 0..4 {
            controller.tick(frame * 16);
        }
        assert_eq!(controller.phase(), Phase::Energy);
        assert_eq!(controller.energy_frames_rendered(), 4);
        assert_eq!(controller.final_has_static_outline(), Some(false));
    }

    #[test]
    fn reduced_motion_renders_one_energy_frame() {
        let mut controller = controller();
        controller.set_reduced_motion(true);
        provide_all(&mut controller);
        controller.set_population(4000);
        controller.submit_final(plan(10, false)).expect("final");
        for frame in 0..6 {
            controller.tick(frame * 16);
        }
        assert_eq!(controller.energy_frames_rendered(), 1);
        assert!(!controller.energy_running());
    }

    #[test]
    fn lifting_reduced_motion_resumes_energy() {
        let mut controller = controller();
        controller.set_reduced_motion(true);
        provide_all(&mut controller);
        controller.set_population(4000);
        controller.submit_final(plan(10, false)).expect("final");
        for frame in 0..3 {
            controller.tick(frame * 16);
        }
        assert_eq!(controller.energy_frames_rendered(), 1);

        controller.set_reduced_motion(false);
        for frame in 3..8 {
            controller.tick(frame * 16);
        }
        assert!(controller.energy_frames_rendered() > 1);
        assert!(controller.energy_running());
        assert_eq!(controller.phase(), Phase::Energy);
    }

    #[test]
    fn pupils_follow_population_after_final() {
        let mut controller = controller();
        provide_all(&mut controller);
        controller.submit_final(plan(10, false)).expect("final");
        controller.tick(0);
        let pupil = (16 * SIZE + 16) as usize;
        let before = controller.final_frame().expect("final").pixels()[pupil];

        controller.set_population(1000);
        controller.tick(16);
        controller.tick(32);
        let after = controller.final_frame().expect("final").pixels()[pupil];
        assert_ne!(before, after);
        assert!(after.red() < before.red(), "pupil darkens over the eye");
        assert_eq!(controller.phase(), Phase::Final);
    }

    #[test]
    fn shape_swap_cancels_energy() {
        let mut controller = controller();
        provide_all(&mut controller);
        controller.set_population(4000);
        controller.submit_final(plan(10, false)).expect("final");
        controller.tick(0);
        let token = controller.energy_token().expect("energy token");
        controller.provide_shape(ShapeKind::Nostrils, shape(|x, y| x == 30 && y == 30));
        assert!(token.is_cancelled());
        controller.tick(16);
        assert_eq!(controller.phase(), Phase::Energy, "energy restarts on the new masks");
    }

    #[test]
    fn external_cancel_stops_energy() {
        let mut controller = controller();
        provide_all(&mut controller);
        controller.set_population(4000);
        controller.submit_final(plan(10, false)).expect("final");
        controller.tick(0);
        controller.energy_token().expect("token").cancel();
        controller.tick(16);
        controller.tick(32);
        assert_eq!(controller.energy_frames_rendered(), 1);
        assert_eq!(controller.phase(), Phase::Final);
    }

    #[test]
    fn fail_halts_and_shows_backdrop() {
        let mut controller = controller();
        provide_all(&mut controller);
        controller.set_population(4000);
        controller.submit_final(plan(10, false)).expect("final");
        controller.tick(0);
        controller.fail(MosaicError::Session("stats unavailable".into()));
        controller.tick(16);
        assert_eq!(controller.phase(), Phase::Failed);
        assert_eq!(controller.energy_frames_rendered(), 1);
        let [r, g, b] = controller.config.palette.error_backdrop;
        let px = controller.surface().pixels()[0];
        assert_eq!((px.red(), px.green(), px.blue(), px.alpha()), (r, g, b, 255));
        assert!(controller.submit_final(plan(1, false)).is_err());
    }

    #[test]
    fn resize_reblits_without_recomposing() {
        let mut controller = controller();
        provide_all(&mut controller);
        controller.submit_final(plan(10, false)).expect("final");
        controller.tick(0);
        let before = controller.final_frame().expect("final").data().to_vec();
        controller.resize(200, 100).expect("resize");
        assert_eq!(controller.surface().width(), 200);
        assert_eq!(controller.final_frame().expect("final").data(), &before[..]);
        let lit = controller
            .surface()
            .pixels()
            .iter()
            .filter(|px| px.alpha() > 0)
            .count();
        assert!(lit > 0);
    }
}
