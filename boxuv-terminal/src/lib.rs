/// Terminal viewport for box-projected UVs
use anyhow::Result;
use boxuv_core::{
    AssetGuid, AssetStorage, BindingState, Gesture, ObjectKey, Refresh, Revert, SceneGraph, TILING_RANGES,
};
use crossterm::{
    cursor,
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, MouseButton, MouseEventKind},
    execute, queue,
    style::{Color, Print, ResetColor, SetForegroundColor},
    terminal::{self},
};
use std::collections::HashMap;
use std::io::{stdout, Write};
use std::time::{Duration, Instant};

pub mod camera;
pub mod project;
pub mod renderer;

pub use camera::Camera;
pub use project::Project;
pub use renderer::{AsciiRenderer, RenderMesh};

/// Scale change per column of mouse drag
const DRAG_SCALE_PER_COLUMN: f32 = 0.05;
const MIN_SCALE: f32 = 0.01;

/// Something the user asked the viewport to do
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Action {
    Quit,
    NextObject,
    Orbit(f32, f32),
    Zoom(f32),
    SelectAxis(usize),
    /// Multiply the selected axis' scale in a single gesture
    Scale(f32),
    /// Multiply the tiling factor
    Tiling(f32),
    NextTilingRange,
    OffsetU(f32),
    OffsetV(f32),
    ToggleRotation,
    /// Turn the selected object around the vertical axis, degrees
    Spin(f32),
    Generate,
    Revert,
}

impl Action {
    pub fn from_key(code: KeyCode) -> Option<Self> {
        let action = match code {
            KeyCode::Char('q') | KeyCode::Esc => Action::Quit,
            KeyCode::Tab => Action::NextObject,
            KeyCode::Char('w') | KeyCode::Up => Action::Orbit(0.0, 0.1),
            KeyCode::Char('s') | KeyCode::Down => Action::Orbit(0.0, -0.1),
            KeyCode::Char('a') | KeyCode::Left => Action::Orbit(-0.1, 0.0),
            KeyCode::Char('d') | KeyCode::Right => Action::Orbit(0.1, 0.0),
            KeyCode::PageUp => Action::Zoom(0.9),
            KeyCode::PageDown => Action::Zoom(1.1),
            KeyCode::Char('x') => Action::SelectAxis(0),
            KeyCode::Char('y') => Action::SelectAxis(1),
            KeyCode::Char('z') => Action::SelectAxis(2),
            KeyCode::Char('+') | KeyCode::Char('=') => Action::Scale(1.1),
            KeyCode::Char('-') => Action::Scale(1.0 / 1.1),
            KeyCode::Char('t') => Action::Tiling(1.25),
            KeyCode::Char('T') => Action::Tiling(0.8),
            KeyCode::Char('r') => Action::NextTilingRange,
            KeyCode::Char('u') => Action::OffsetU(0.05),
            KeyCode::Char('U') => Action::OffsetU(-0.05),
            KeyCode::Char('v') => Action::OffsetV(0.05),
            KeyCode::Char('V') => Action::OffsetV(-0.05),
            KeyCode::Char('i') => Action::ToggleRotation,
            KeyCode::Char('e') => Action::Spin(15.0),
            KeyCode::Char('E') => Action::Spin(-15.0),
            KeyCode::Char('g') => Action::Generate,
            KeyCode::Char('n') => Action::Revert,
            _ => return None,
        };
        Some(action)
    }
}

/// Interactive session over one project
pub struct Viewport {
    project: Project,
    objects: Vec<ObjectKey>,
    selected: usize,
    axis: usize,
    gesture: Gesture,
    drag_origin: Option<u16>,
    settings_dirty: bool,
    meshes: HashMap<AssetGuid, RenderMesh>,
    camera: Camera,
    renderer: AsciiRenderer,
    status: String,
    running: bool,
    last_frame: Instant,
    frame_count: u32,
    fps: f32,
}

impl Viewport {
    pub fn new(project: Project, width: u16, height: u16) -> Self {
        let objects = project
            .scene
            .roots()
            .flat_map(|root| project.scene.mesh_descendants(&root.id))
            .collect();

        let mut viewport = Self {
            project,
            objects,
            selected: 0,
            axis: 0,
            gesture: Gesture::new(),
            drag_origin: None,
            settings_dirty: false,
            meshes: HashMap::new(),
            camera: Camera::new(width as u32, height as u32),
            renderer: AsciiRenderer::new(width as usize, height as usize),
            status: String::new(),
            running: true,
            last_frame: Instant::now(),
            frame_count: 0,
            fps: 0.0,
        };
        viewport.frame_selected();
        viewport
    }

    pub fn project(&self) -> &Project {
        &self.project
    }

    pub fn selected(&self) -> Option<&ObjectKey> {
        self.objects.get(self.selected)
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    /// Run until the user quits, then save the project.
    pub fn run(&mut self) -> Result<()> {
        terminal::enable_raw_mode()?;
        execute!(stdout(), terminal::EnterAlternateScreen, EnableMouseCapture, cursor::Hide)?;

        let result = self.main_loop();
        let saved = self.finish();

        // Cleanup
        terminal::disable_raw_mode()?;
        execute!(stdout(), DisableMouseCapture, terminal::LeaveAlternateScreen, cursor::Show)?;

        result.and(saved)
    }

    /// End any open gesture and write settings, bindings and scene.
    pub fn finish(&mut self) -> Result<()> {
        self.gesture.pointer_up(&mut self.project.session)?;
        if self.settings_dirty {
            self.project.commit_settings()?;
            self.settings_dirty = false;
        } else {
            self.project.session.save()?;
        }
        self.project.save_scene()
    }

    fn main_loop(&mut self) -> Result<()> {
        let target_frame_time = Duration::from_millis(1000 / 30); // 30 FPS target

        while self.running {
            let frame_start = Instant::now();

            while event::poll(Duration::from_millis(0))? {
                self.handle_event(event::read()?);
            }

            self.render()?;

            // Frame timing
            self.frame_count += 1;
            let elapsed = frame_start.elapsed();
            if elapsed < target_frame_time {
                std::thread::sleep(target_frame_time - elapsed);
            }

            // Update FPS counter
            let now = Instant::now();
            if (now - self.last_frame).as_secs() >= 1 {
                self.fps = self.frame_count as f32 / (now - self.last_frame).as_secs_f32();
                self.frame_count = 0;
                self.last_frame = now;
            }
        }

        Ok(())
    }

    /// Failed edits are reported in the status line; the session stays open.
    fn handle_event(&mut self, event: Event) {
        let result = match event {
            Event::Key(KeyEvent { code, .. }) => match Action::from_key(code) {
                Some(action) => self.apply(action),
                None => Ok(()),
            },
            Event::Mouse(mouse) => match mouse.kind {
                MouseEventKind::Down(MouseButton::Left) => self.pointer_down(mouse.column),
                MouseEventKind::Drag(MouseButton::Left) => self.pointer_drag(mouse.column),
                MouseEventKind::Up(MouseButton::Left) => self.pointer_up(),
                _ => Ok(()),
            },
            Event::Resize(width, height) => {
                self.camera.resize(width as u32, height as u32);
                self.renderer.resize(width as usize, height as usize);
                Ok(())
            }
            _ => Ok(()),
        };

        if let Err(err) = result {
            tracing::warn!("{err:#}");
            self.status = format!("Error: {err}");
        }
    }

    pub fn apply(&mut self, action: Action) -> Result<()> {
        match action {
            Action::Quit => self.running = false,
            Action::NextObject => {
                if !self.objects.is_empty() {
                    self.selected = (self.selected + 1) % self.objects.len();
                    self.frame_selected();
                }
            }
            Action::Orbit(yaw, pitch) => self.camera.orbit(yaw, pitch),
            Action::Zoom(factor) => self.camera.zoom(factor),
            Action::SelectAxis(axis) => {
                self.axis = axis.min(2);
                self.status = format!("Scaling along {}", ["X", "Y", "Z"][self.axis]);
            }
            Action::Scale(factor) => {
                self.begin_gesture()?;
                self.scale_selected(|s| s * factor);
                self.drag_gesture()?;
                self.pointer_up()?;
            }
            Action::Tiling(factor) => {
                let tiling = self.project.config.projection.tiling_factor() * factor;
                self.project.config.projection.set_tiling_factor(tiling);
                self.settings_changed()?;
            }
            Action::NextTilingRange => {
                let next = (self.project.config.projection.tiling_range() + 1) % TILING_RANGES.len();
                self.project.config.projection.set_tiling_range(next);
                self.settings_changed()?;
            }
            Action::OffsetU(delta) | Action::OffsetV(delta) => {
                let mut offset = self.project.config.projection.uv_offset();
                if matches!(action, Action::OffsetU(_)) {
                    offset.x += delta;
                } else {
                    offset.y += delta;
                }
                self.project.config.projection.set_uv_offset([offset.x, offset.y]);
                self.settings_changed()?;
            }
            Action::ToggleRotation => {
                let ignore = !self.project.config.projection.ignore_object_rotation();
                self.project.config.projection.set_ignore_object_rotation(ignore);
                self.settings_changed()?;
            }
            Action::Spin(degrees) => {
                if let Some(key) = self.selected().cloned() {
                    if let Some(object) = self.project.scene.get_mut(&key) {
                        object.rotation[1] += degrees;
                    }
                    self.refresh_selected()?;
                }
            }
            Action::Generate => {
                let report = self.project.generate(None)?;
                self.meshes.clear();
                self.status = format!(
                    "Generated {} mesh(es), skipped {}",
                    report.generated,
                    report.skipped.len()
                );
            }
            Action::Revert => {
                if let Some(key) = self.selected().cloned() {
                    self.status = match self.project.revert(key.as_str())? {
                        Revert::Restored(_) => format!("Reverted {key}"),
                        Revert::NothingToRevert => format!("{key} has nothing to revert"),
                    };
                }
            }
        }
        Ok(())
    }

    fn settings_changed(&mut self) -> Result<()> {
        self.settings_dirty = true;
        self.refresh_selected()?;
        let p = &self.project.config.projection;
        self.status = format!(
            "Tiling {:.3} (max {}) | Offset {:.2},{:.2} | {}",
            p.tiling_factor(),
            p.tiling_range_max(),
            p.uv_offset().x,
            p.uv_offset().y,
            if p.ignore_object_rotation() { "world" } else { "local" }
        );
        Ok(())
    }

    fn refresh_selected(&mut self) -> Result<()> {
        let Some(key) = self.selected().cloned() else {
            return Ok(());
        };
        let refresh = self.project.session.refresh_object(
            &mut self.project.scene,
            &key,
            &self.project.config.projection,
        )?;
        self.cache_refresh(refresh);
        Ok(())
    }

    fn pointer_down(&mut self, column: u16) -> Result<()> {
        if self.begin_gesture()? {
            self.drag_origin = Some(column);
        }
        Ok(())
    }

    fn pointer_drag(&mut self, column: u16) -> Result<()> {
        let Some(origin) = self.drag_origin else {
            return Ok(());
        };
        let delta = (column as f32 - origin as f32) * DRAG_SCALE_PER_COLUMN;
        self.drag_origin = Some(column);
        self.scale_selected(|s| s + delta);
        self.drag_gesture()
    }

    fn pointer_up(&mut self) -> Result<()> {
        self.drag_origin = None;
        self.gesture.pointer_up(&mut self.project.session)?;
        self.project.save_scene()
    }

    fn begin_gesture(&mut self) -> Result<bool> {
        let Some(key) = self.selected().cloned() else {
            return Ok(false);
        };
        let started = self
            .gesture
            .pointer_down(&mut self.project.session, &self.project.scene, &key)?;
        if !started {
            self.status = format!("{key} has no mesh");
        }
        Ok(started)
    }

    fn drag_gesture(&mut self) -> Result<()> {
        let refresh = self.gesture.drag(
            &mut self.project.session,
            &mut self.project.scene,
            &self.project.config.projection,
        )?;
        self.cache_refresh(refresh);
        Ok(())
    }

    fn scale_selected(&mut self, f: impl Fn(f32) -> f32) {
        let axis = self.axis;
        if let Some(key) = self.gesture.target().cloned() {
            if let Some(object) = self.project.scene.get_mut(&key) {
                object.scale[axis] = f(object.scale[axis]).max(MIN_SCALE);
            }
        }
    }

    fn cache_refresh(&mut self, refresh: Refresh) {
        if let Refresh::Applied(refreshed) = refresh {
            self.meshes.insert(refreshed.guid, RenderMesh::from(&refreshed.mesh));
        }
    }

    /// GUID of the mesh `key` currently shows, loading it into the cache
    /// on first use.
    fn cached_mesh(&mut self, key: &ObjectKey) -> Option<AssetGuid> {
        let guid = self.project.scene.active_mesh(key)?;
        if !self.meshes.contains_key(&guid) {
            match self.project.session.storage().load_by_guid(&guid) {
                Ok(asset) => {
                    self.meshes.insert(guid.clone(), RenderMesh::from(&asset));
                }
                Err(err) => {
                    tracing::warn!(object = %key, "cannot display mesh: {err}");
                    return None;
                }
            }
        }
        Some(guid)
    }

    fn frame_selected(&mut self) {
        let Some(key) = self.selected().cloned() else {
            return;
        };
        let Some(transform) = self.project.scene.world_transform(&key) else {
            return;
        };
        let bounds = self
            .cached_mesh(&key)
            .and_then(|guid| self.meshes.get(&guid))
            .and_then(|mesh| mesh.bounds(&transform));
        if let Some((min, max)) = bounds {
            self.camera.frame(min, max);
        }
    }

    fn render(&mut self) -> Result<()> {
        self.renderer.clear();

        for key in self.objects.clone() {
            let Some(transform) = self.project.scene.world_transform(&key) else {
                continue;
            };
            if let Some(mesh) = self.cached_mesh(&key).and_then(|guid| self.meshes.get(&guid)) {
                self.renderer.render_mesh(mesh, &transform, &self.camera);
            }
        }

        let mut stdout = stdout();
        queue!(stdout, cursor::MoveTo(0, 0))?;
        self.renderer.draw(&mut stdout)?;

        let selected = match self.selected() {
            Some(key) => {
                let state = match self.project.session.state(key) {
                    BindingState::Unbound => "unbound",
                    BindingState::BoundNoDerived => "captured",
                    BindingState::BoundWithDerived => "projected",
                };
                format!("{key} [{state}] axis {}", ["X", "Y", "Z"][self.axis])
            }
            None => "no objects".to_string(),
        };

        // UI overlay
        queue!(
            stdout,
            cursor::MoveTo(0, 0),
            SetForegroundColor(Color::Yellow),
            Print(format!("boxuv | FPS: {:.1} | {selected} | {}", self.fps, self.status)),
            cursor::MoveTo(0, 1),
            SetForegroundColor(Color::DarkGrey),
            Print("Tab=Select WASD=Orbit x/y/z=Axis +/-/Drag=Scale t/T r u/U v/V i=Settings e=Spin g=Generate n=Revert q=Quit"),
            ResetColor
        )?;

        stdout.flush()?;
        Ok(())
    }
}
