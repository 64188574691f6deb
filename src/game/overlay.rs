use std::rc::Rc;

use eframe::egui;
use egui::{Color32, Key, Pos2, Rect, Stroke, Vec2};

use super::leaderboard::{Entry, Leaderboard};
use super::physics::{
    BALL_RADIUS, Breakout, CAPSULE_HEIGHT, CAPSULE_WIDTH, CapsuleKind, FIELD_HEIGHT, FIELD_WIDTH,
    PADDLE_HEIGHT, PADDLE_Y, Phase,
};
use crate::storage::KeyValueStore;

const KONAMI: [Key; 10] = [
    Key::ArrowUp,
    Key::ArrowUp,
    Key::ArrowDown,
    Key::ArrowDown,
    Key::ArrowLeft,
    Key::ArrowRight,
    Key::ArrowLeft,
    Key::ArrowRight,
    Key::B,
    Key::A,
];

/// Matches the Konami sequence over a stream of key presses.
#[derive(Debug, Default, Clone)]
pub struct KonamiDetector {
    progress: usize,
}

impl KonamiDetector {
    /// Feeds one key press; true when it completes the sequence.
    pub fn feed(&mut self, key: Key) -> bool {
        if KONAMI[self.progress] == key {
            self.progress += 1;
        } else {
            // "up up up" must still count as the start.
            self.progress = match key {
                Key::ArrowUp if self.progress >= 2 && KONAMI[..self.progress].iter().all(|k| *k == Key::ArrowUp) => 2,
                k if k == KONAMI[0] => 1,
                _ => 0,
            };
        }
        if self.progress == KONAMI.len() {
            self.progress = 0;
            return true;
        }
        false
    }
}

pub struct BreakoutOverlay {
    open: bool,
    konami: KonamiDetector,
    game: Breakout,
    leaderboard: Leaderboard,
    player_name: String,
    submitted: Option<Option<usize>>,
    store: Rc<dyn KeyValueStore>,
}

impl BreakoutOverlay {
    pub fn new(store: Rc<dyn KeyValueStore>, seed: u64) -> Self {
        Self {
            open: false,
            konami: KonamiDetector::default(),
            game: Breakout::new(seed),
            leaderboard: Leaderboard::load(store.as_ref()),
            player_name: String::new(),
            submitted: None,
            store,
        }
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn toggle(&mut self) {
        self.open = !self.open;
        if self.open {
            log::info!("breakout: opened");
            self.game.restart();
            self.submitted = None;
        }
    }

    /// Watches for the toggle sequence and draws the game while open.
    pub fn show(&mut self, ctx: &egui::Context) {
        let pressed: Vec<Key> = ctx.input(|i| {
            i.events
                .iter()
                .filter_map(|e| match e {
                    egui::Event::Key {
                        key, pressed: true, repeat: false, ..
                    } => Some(*key),
                    _ => None,
                })
                .collect()
        });
        for key in &pressed {
            if self.konami.feed(*key) {
                self.toggle();
            }
        }
        if !self.open {
            return;
        }
        if pressed.contains(&Key::Escape) {
            self.open = false;
            return;
        }

        let typing = self.game.phase == Phase::GameOver;
        if !typing {
            self.handle_keys(ctx, &pressed);
        }
        self.game.update(ctx.input(|i| i.stable_dt));

        let mut open = self.open;
        egui::Window::new("Breakout")
            .open(&mut open)
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, Vec2::ZERO)
            .show(ctx, |ui| {
                ui.horizontal(|ui| {
                    ui.label(format!("Score {}", self.game.score));
                    ui.separator();
                    ui.label(format!("Level {}", self.game.level));
                    ui.separator();
                    ui.label(format!("Lives {}", self.game.lives));
                });
                self.draw_field(ui);
                match self.game.phase {
                    Phase::Serving => {
                        ui.weak("Space to launch, arrows or mouse to move, P to pause");
                    }
                    Phase::Paused => {
                        ui.weak("Paused");
                    }
                    Phase::GameOver => self.game_over_ui(ui),
                    Phase::Playing => {}
                }
            });
        self.open = open;
        ctx.request_repaint();
    }

    fn handle_keys(&mut self, ctx: &egui::Context, pressed: &[Key]) {
        let (left, right) = ctx.input(|i| {
            (
                i.key_down(Key::ArrowLeft) || i.key_down(Key::A),
                i.key_down(Key::ArrowRight) || i.key_down(Key::D),
            )
        });
        let dir = f32::from(u8::from(right)) - f32::from(u8::from(left));
        self.game.set_paddle_direction(dir);
        if dir != 0.0 {
            self.game.set_paddle_target(None);
        }
        if pressed.contains(&Key::Space) {
            self.game.launch();
        }
        if pressed.contains(&Key::P) {
            self.game.toggle_pause();
        }
    }

    fn draw_field(&mut self, ui: &mut egui::Ui) {
        let scale = (ui.ctx().screen_rect().width() * 0.8 / FIELD_WIDTH).clamp(0.5, 1.5);
        let (rect, response) =
            ui.allocate_exact_size(Vec2::new(FIELD_WIDTH, FIELD_HEIGHT) * scale, egui::Sense::hover());
        let to_screen = |x: f32, y: f32| Pos2::new(rect.min.x + x * scale, rect.min.y + y * scale);

        if let Some(pointer) = response.hover_pos() {
            if ui.input(|i| i.pointer.delta() != Vec2::ZERO) {
                self.game.set_paddle_target(Some((pointer.x - rect.min.x) / scale));
            }
        }

        let painter = ui.painter_at(rect);
        painter.rect_filled(rect, 4.0, Color32::from_rgb(16, 18, 28));

        for brick in &self.game.bricks {
            let color = if brick.hits > 1 {
                Color32::from_rgb(232, 120, 48)
            } else {
                Color32::from_rgb(80, 160, 230)
            };
            painter.rect_filled(
                Rect::from_min_max(to_screen(brick.min.x, brick.min.y), to_screen(brick.max.x, brick.max.y)),
                2.0,
                color,
            );
        }

        let half = self.game.paddle_width() / 2.0;
        painter.rect_filled(
            Rect::from_min_max(
                to_screen(self.game.paddle_x - half, PADDLE_Y),
                to_screen(self.game.paddle_x + half, PADDLE_Y + PADDLE_HEIGHT),
            ),
            3.0,
            Color32::from_gray(230),
        );

        for ball in &self.game.balls {
            painter.circle_filled(to_screen(ball.pos.x, ball.pos.y), BALL_RADIUS * scale, Color32::WHITE);
        }

        for capsule in &self.game.capsules {
            let color = match capsule.kind {
                CapsuleKind::WidePaddle => Color32::from_rgb(90, 200, 120),
                CapsuleKind::SlowBall => Color32::from_rgb(120, 140, 240),
                CapsuleKind::MultiBall => Color32::from_rgb(230, 200, 60),
                CapsuleKind::ExtraLife => Color32::from_rgb(230, 80, 110),
            };
            let center = to_screen(capsule.pos.x, capsule.pos.y);
            let capsule_rect = Rect::from_center_size(center, Vec2::new(CAPSULE_WIDTH, CAPSULE_HEIGHT) * scale);
            painter.rect(capsule_rect, 5.0, color, Stroke::new(1.0, Color32::BLACK));
            painter.text(
                center,
                egui::Align2::CENTER_CENTER,
                capsule.kind.letter(),
                egui::FontId::monospace(9.0 * scale),
                Color32::BLACK,
            );
        }
    }

    fn game_over_ui(&mut self, ui: &mut egui::Ui) {
        ui.heading(format!("Game over: {} points", self.game.score));
        match self.submitted {
            None if self.leaderboard.qualifies(self.game.score) => {
                ui.horizontal(|ui| {
                    ui.label("Name");
                    ui.text_edit_singleline(&mut self.player_name);
                    if ui.button("Save score").clicked() {
                        let rank = self.leaderboard.submit(Entry {
                            name: self.player_name.clone(),
                            score: self.game.score,
                            level: self.game.level,
                        });
                        self.leaderboard.save(self.store.as_ref());
                        self.submitted = Some(rank);
                    }
                });
            }
            Some(Some(rank)) => {
                ui.label(format!("You placed #{}", rank + 1));
            }
            _ => {}
        }

        ui.separator();
        egui::Grid::new("breakout_leaderboard").striped(true).show(ui, |ui| {
            for (i, entry) in self.leaderboard.entries().iter().enumerate() {
                ui.label(format!("{}.", i + 1));
                ui.label(&entry.name);
                ui.label(entry.score.to_string());
                ui.label(format!("L{}", entry.level));
                ui.end_row();
            }
        });

        if ui.button("Play again").clicked() {
            self.game.restart();
            self.submitted = None;
        }
    }
}
