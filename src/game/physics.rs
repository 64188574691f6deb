//! Fixed-step brick-breaker simulation. Coordinates are field units with the
//! origin top-left and y growing downwards.

use nalgebra::Vector2;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

pub const FIELD_WIDTH: f32 = 480.0;
pub const FIELD_HEIGHT: f32 = 360.0;
pub const STEP: f32 = 1.0 / 120.0;

pub const PADDLE_WIDTH: f32 = 72.0;
pub const PADDLE_HEIGHT: f32 = 10.0;
pub const PADDLE_Y: f32 = FIELD_HEIGHT - 28.0;
const PADDLE_SPEED: f32 = 420.0;

pub const BALL_RADIUS: f32 = 5.0;
const BASE_BALL_SPEED: f32 = 240.0;
/// Steepest paddle bounce, measured from vertical.
const MAX_BOUNCE: f32 = std::f32::consts::FRAC_PI_3;

const BRICK_COLS: usize = 10;
const BRICK_HEIGHT: f32 = 14.0;
const BRICK_GAP: f32 = 4.0;
const BRICK_TOP: f32 = 40.0;

const CAPSULE_SPEED: f32 = 90.0;
pub const CAPSULE_WIDTH: f32 = 22.0;
pub const CAPSULE_HEIGHT: f32 = 10.0;
const CAPSULE_CHANCE: f64 = 0.18;

const START_LIVES: u32 = 3;
const MAX_LIVES: u32 = 5;
const MAX_BALLS: usize = 8;
const WIDE_SECONDS: f32 = 10.0;
const SLOW_SECONDS: f32 = 8.0;
const SLOW_FACTOR: f32 = 0.6;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ball {
    pub pos: Vector2<f32>,
    pub vel: Vector2<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Brick {
    pub min: Vector2<f32>,
    pub max: Vector2<f32>,
    pub hits: u32,
}

impl Brick {
    fn center(&self) -> Vector2<f32> {
        (self.min + self.max) * 0.5
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapsuleKind {
    WidePaddle,
    SlowBall,
    MultiBall,
    ExtraLife,
}

impl CapsuleKind {
    pub const ALL: [CapsuleKind; 4] = [
        Self::WidePaddle,
        Self::SlowBall,
        Self::MultiBall,
        Self::ExtraLife,
    ];

    pub fn letter(self) -> &'static str {
        match self {
            Self::WidePaddle => "W",
            Self::SlowBall => "S",
            Self::MultiBall => "M",
            Self::ExtraLife => "+",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Capsule {
    pub kind: CapsuleKind,
    /// Center.
    pub pos: Vector2<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Ball resting on the paddle, waiting for launch.
    Serving,
    Playing,
    Paused,
    GameOver,
}

pub struct Breakout {
    pub balls: Vec<Ball>,
    pub bricks: Vec<Brick>,
    pub capsules: Vec<Capsule>,
    pub paddle_x: f32,
    pub lives: u32,
    pub score: u32,
    pub level: u32,
    pub phase: Phase,
    wide_timer: f32,
    slow_timer: f32,
    /// -1, 0 or 1 from the keyboard.
    paddle_dir: f32,
    paddle_target: Option<f32>,
    accumulator: f32,
    rng: SmallRng,
}

impl Breakout {
    pub fn new(seed: u64) -> Self {
        let mut game = Self {
            balls: Vec::new(),
            bricks: Vec::new(),
            capsules: Vec::new(),
            paddle_x: FIELD_WIDTH / 2.0,
            lives: START_LIVES,
            score: 0,
            level: 1,
            phase: Phase::Serving,
            wide_timer: 0.0,
            slow_timer: 0.0,
            paddle_dir: 0.0,
            paddle_target: None,
            accumulator: 0.0,
            rng: SmallRng::seed_from_u64(seed),
        };
        game.build_level();
        game
    }

    pub fn restart(&mut self) {
        let seed = self.rng.r#gen();
        *self = Self::new(seed);
    }

    fn build_level(&mut self) {
        let rows = (3 + self.level as usize).min(8);
        let width = (FIELD_WIDTH - BRICK_GAP * (BRICK_COLS as f32 + 1.0)) / BRICK_COLS as f32;
        self.bricks.clear();
        for row in 0..rows {
            for col in 0..BRICK_COLS {
                let min = Vector2::new(
                    BRICK_GAP + col as f32 * (width + BRICK_GAP),
                    BRICK_TOP + row as f32 * (BRICK_HEIGHT + BRICK_GAP),
                );
                // Top rows get tougher on later levels.
                let hits = if row < (self.level as usize).saturating_sub(1) { 2 } else { 1 };
                self.bricks.push(Brick {
                    min,
                    max: min + Vector2::new(width, BRICK_HEIGHT),
                    hits,
                });
            }
        }
        self.capsules.clear();
        self.serve();
    }

    fn serve(&mut self) {
        self.phase = Phase::Serving;
        self.balls = vec![Ball {
            pos: Vector2::new(self.paddle_x, PADDLE_Y - BALL_RADIUS),
            vel: Vector2::zeros(),
        }];
    }

    pub fn ball_speed(&self) -> f32 {
        BASE_BALL_SPEED + 20.0 * (self.level - 1) as f32
    }

    pub fn paddle_width(&self) -> f32 {
        if self.wide_timer > 0.0 {
            PADDLE_WIDTH * 1.5
        } else {
            PADDLE_WIDTH
        }
    }

    pub fn speed_factor(&self) -> f32 {
        if self.slow_timer > 0.0 { SLOW_FACTOR } else { 1.0 }
    }

    pub fn set_paddle_direction(&mut self, dir: f32) {
        self.paddle_dir = dir.clamp(-1.0, 1.0);
    }

    /// Pointer steering; overrides the keyboard until cleared.
    pub fn set_paddle_target(&mut self, x: Option<f32>) {
        self.paddle_target = x;
    }

    /// Releases the served ball at a slightly random angle.
    pub fn launch(&mut self) {
        if self.phase != Phase::Serving {
            return;
        }
        let angle: f32 = self.rng.gen_range(-0.35..0.35);
        let speed = self.ball_speed();
        for ball in &mut self.balls {
            ball.vel = Vector2::new(speed * angle.sin(), -speed * angle.cos());
        }
        self.phase = Phase::Playing;
    }

    pub fn toggle_pause(&mut self) {
        self.phase = match self.phase {
            Phase::Playing => Phase::Paused,
            Phase::Paused => Phase::Playing,
            other => other,
        };
    }

    /// Advances by `dt` seconds of wall time in fixed steps.
    pub fn update(&mut self, dt: f32) {
        if matches!(self.phase, Phase::Paused | Phase::GameOver) {
            return;
        }
        self.accumulator += dt.clamp(0.0, 0.25);
        while self.accumulator >= STEP {
            self.accumulator -= STEP;
            self.step();
            if self.phase == Phase::GameOver {
                self.accumulator = 0.0;
                break;
            }
        }
    }

    pub fn step(&mut self) {
        self.move_paddle();
        self.wide_timer = (self.wide_timer - STEP).max(0.0);
        self.slow_timer = (self.slow_timer - STEP).max(0.0);

        if self.phase == Phase::Serving {
            for ball in &mut self.balls {
                ball.pos = Vector2::new(self.paddle_x, PADDLE_Y - BALL_RADIUS);
            }
            self.step_capsules();
            return;
        }
        if self.phase != Phase::Playing {
            return;
        }

        let factor = self.speed_factor();
        let paddle_x = self.paddle_x;
        let half = self.paddle_width() / 2.0;
        let mut broken = Vec::new();
        for ball in &mut self.balls {
            ball.pos += ball.vel * STEP * factor;
            bounce_walls(ball);
            bounce_paddle(ball, paddle_x, half);
            if let Some(index) = hit_brick(ball, &self.bricks) {
                broken.push(index);
            }
        }
        for index in broken {
            self.damage_brick(index);
        }
        self.bricks.retain(|b| b.hits > 0);
        self.balls.retain(|b| b.pos.y - BALL_RADIUS <= FIELD_HEIGHT);
        self.step_capsules();

        if self.balls.is_empty() {
            self.lose_life();
        } else if self.bricks.is_empty() {
            self.level += 1;
            log::info!("breakout: level {}", self.level);
            self.build_level();
        }
    }

    fn move_paddle(&mut self) {
        let half = self.paddle_width() / 2.0;
        let max_move = PADDLE_SPEED * STEP;
        let delta = match self.paddle_target {
            Some(target) => (target - self.paddle_x).clamp(-max_move, max_move),
            None => self.paddle_dir * max_move,
        };
        self.paddle_x = (self.paddle_x + delta).clamp(half, FIELD_WIDTH - half);
    }

    fn damage_brick(&mut self, index: usize) {
        // Two balls may hit the same brick in one step; cleared bricks are
        // dropped by the caller.
        let Some(brick) = self.bricks.get_mut(index) else {
            return;
        };
        if brick.hits == 0 {
            return;
        }
        brick.hits -= 1;
        self.score += 10 * self.level;
        if brick.hits == 0 {
            let center = brick.center();
            if self.rng.gen_bool(CAPSULE_CHANCE) {
                let kind = CapsuleKind::ALL[self.rng.gen_range(0..CapsuleKind::ALL.len())];
                self.drop_capsule(kind, center);
            }
        }
    }

    pub fn drop_capsule(&mut self, kind: CapsuleKind, pos: Vector2<f32>) {
        self.capsules.push(Capsule { kind, pos });
    }

    fn step_capsules(&mut self) {
        let half_paddle = self.paddle_width() / 2.0;
        let mut caught = Vec::new();
        for capsule in &mut self.capsules {
            capsule.pos.y += CAPSULE_SPEED * STEP;
        }
        let paddle_x = self.paddle_x;
        self.capsules.retain(|c| {
            let bottom = c.pos.y + CAPSULE_HEIGHT / 2.0;
            let overlaps_x = (c.pos.x - paddle_x).abs() <= half_paddle + CAPSULE_WIDTH / 2.0;
            if overlaps_x && bottom >= PADDLE_Y && c.pos.y <= PADDLE_Y + PADDLE_HEIGHT {
                caught.push(c.kind);
                return false;
            }
            c.pos.y - CAPSULE_HEIGHT / 2.0 <= FIELD_HEIGHT
        });
        for kind in caught {
            self.apply(kind);
        }
    }

    pub fn apply(&mut self, kind: CapsuleKind) {
        log::debug!("breakout: capsule {kind:?}");
        match kind {
            CapsuleKind::WidePaddle => self.wide_timer = WIDE_SECONDS,
            CapsuleKind::SlowBall => self.slow_timer = SLOW_SECONDS,
            CapsuleKind::ExtraLife => self.lives = (self.lives + 1).min(MAX_LIVES),
            CapsuleKind::MultiBall => {
                if self.phase != Phase::Playing {
                    return;
                }
                let mut extra = Vec::new();
                for ball in &self.balls {
                    for angle in [-0.4f32, 0.4] {
                        let (s, c) = angle.sin_cos();
                        let vel = Vector2::new(
                            ball.vel.x * c - ball.vel.y * s,
                            ball.vel.x * s + ball.vel.y * c,
                        );
                        extra.push(Ball { pos: ball.pos, vel });
                    }
                }
                let room = MAX_BALLS.saturating_sub(self.balls.len());
                self.balls.extend(extra.into_iter().take(room));
            }
        }
    }

    fn lose_life(&mut self) {
        self.lives = self.lives.saturating_sub(1);
        self.wide_timer = 0.0;
        self.slow_timer = 0.0;
        self.capsules.clear();
        if self.lives == 0 {
            self.phase = Phase::GameOver;
            log::info!("breakout: game over with {} points", self.score);
        } else {
            self.serve();
        }
    }
}

fn bounce_walls(ball: &mut Ball) {
    if ball.pos.x - BALL_RADIUS < 0.0 {
        ball.pos.x = BALL_RADIUS;
        ball.vel.x = ball.vel.x.abs();
    } else if ball.pos.x + BALL_RADIUS > FIELD_WIDTH {
        ball.pos.x = FIELD_WIDTH - BALL_RADIUS;
        ball.vel.x = -ball.vel.x.abs();
    }
    if ball.pos.y - BALL_RADIUS < 0.0 {
        ball.pos.y = BALL_RADIUS;
        ball.vel.y = ball.vel.y.abs();
    }
}

/// Deflects by where the ball meets the paddle: the center sends it straight
/// up, the edges at up to `MAX_BOUNCE`.
fn bounce_paddle(ball: &mut Ball, paddle_x: f32, half_width: f32) {
    if ball.vel.y <= 0.0 {
        return;
    }
    let within_y = ball.pos.y + BALL_RADIUS >= PADDLE_Y && ball.pos.y - BALL_RADIUS <= PADDLE_Y + PADDLE_HEIGHT;
    let within_x = (ball.pos.x - paddle_x).abs() <= half_width + BALL_RADIUS;
    if !(within_y && within_x) {
        return;
    }
    let offset = ((ball.pos.x - paddle_x) / half_width).clamp(-1.0, 1.0);
    let angle = offset * MAX_BOUNCE;
    let speed = ball.vel.norm();
    ball.vel = Vector2::new(speed * angle.sin(), -speed * angle.cos());
    ball.pos.y = PADDLE_Y - BALL_RADIUS;
}

/// Reflects off the first overlapping brick and returns its index.
fn hit_brick(ball: &mut Ball, bricks: &[Brick]) -> Option<usize> {
    let (index, brick) = bricks.iter().enumerate().find(|(_, b)| {
        let closest = Vector2::new(
            ball.pos.x.clamp(b.min.x, b.max.x),
            ball.pos.y.clamp(b.min.y, b.max.y),
        );
        (ball.pos - closest).norm_squared() < BALL_RADIUS * BALL_RADIUS
    })?;

    let overlap_x = (ball.pos.x + BALL_RADIUS - brick.min.x).min(brick.max.x - (ball.pos.x - BALL_RADIUS));
    let overlap_y = (ball.pos.y + BALL_RADIUS - brick.min.y).min(brick.max.y - (ball.pos.y - BALL_RADIUS));
    if overlap_x < overlap_y {
        ball.vel.x = -ball.vel.x;
        ball.pos.x += if ball.pos.x < brick.center().x { -overlap_x } else { overlap_x };
    } else {
        ball.vel.y = -ball.vel.y;
        ball.pos.y += if ball.pos.y < brick.center().y { -overlap_y } else { overlap_y };
    }
    Some(index)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn playing(seed: u64) -> Breakout {
        let mut game = Breakout::new(seed);
        game.launch();
        game
    }

    fn single_ball(game: &mut Breakout, pos: (f32, f32), vel: (f32, f32)) {
        game.balls = vec![Ball {
            pos: Vector2::new(pos.0, pos.1),
            vel: Vector2::new(vel.0, vel.1),
        }];
    }

    #[test]
    fn serve_follows_paddle_until_launch() {
        let mut game = Breakout::new(1);
        game.set_paddle_direction(1.0);
        for _ in 0..30 {
            game.step();
        }
        assert_eq!(game.phase, Phase::Serving);
        assert!(game.paddle_x > FIELD_WIDTH / 2.0);
        assert_eq!(game.balls[0].pos.x, game.paddle_x);

        game.launch();
        assert_eq!(game.phase, Phase::Playing);
        let speed = game.balls[0].vel.norm();
        assert!((speed - game.ball_speed()).abs() < 1e-3);
        assert!(game.balls[0].vel.y < 0.0);
    }

    #[test]
    fn walls_reflect() {
        let mut game = playing(2);
        game.bricks.clear();
        game.bricks.push(Brick {
            min: Vector2::new(0.0, 0.0),
            max: Vector2::new(1.0, 1.0),
            hits: 1,
        });
        single_ball(&mut game, (BALL_RADIUS + 0.5, 200.0), (-240.0, 0.0));
        game.step();
        assert!(game.balls[0].vel.x > 0.0);

        single_ball(&mut game, (200.0, BALL_RADIUS + 0.5), (0.0, -240.0));
        game.step();
        assert!(game.balls[0].vel.y > 0.0);
    }

    #[test]
    fn paddle_edge_deflects_outwards() {
        let mut game = playing(3);
        let x = game.paddle_x + PADDLE_WIDTH / 2.0 - 1.0;
        single_ball(&mut game, (x, PADDLE_Y - BALL_RADIUS + 1.0), (0.0, 240.0));
        game.step();
        let vel = game.balls[0].vel;
        assert!(vel.y < 0.0, "ball goes back up");
        assert!(vel.x > 0.0, "right edge sends it right");
        assert!((vel.norm() - 240.0).abs() < 1e-3, "speed is preserved");
        assert!(vel.x.atan2(-vel.y) <= MAX_BOUNCE + 1e-4);
    }

    #[test]
    fn breaking_a_brick_scores_and_removes_it() {
        let mut game = playing(4);
        let total = game.bricks.len();
        let target = game.bricks[total - 1];
        let below = target.max.y + BALL_RADIUS - 0.5;
        single_ball(&mut game, (target.center().x, below), (0.0, -240.0));
        game.step();

        assert_eq!(game.bricks.len(), total - 1);
        assert_eq!(game.score, 10);
        assert!(game.balls[0].vel.y > 0.0);
    }

    #[test]
    fn tough_bricks_take_two_hits() {
        let mut game = Breakout::new(5);
        game.level = 2;
        game.build_level();
        game.launch();
        assert!(game.bricks.iter().any(|b| b.hits == 2));

        let index = game.bricks.iter().position(|b| b.hits == 2).unwrap();
        game.damage_brick(index);
        assert_eq!(game.bricks[index].hits, 1);
        game.damage_brick(index);
        game.damage_brick(index);
        assert_eq!(game.bricks[index].hits, 0);
        assert_eq!(game.score, 40, "a cleared brick scores no more");
    }

    #[test]
    fn losing_every_ball_costs_a_life_then_ends() {
        let mut game = playing(6);
        for expected in (0..START_LIVES).rev() {
            single_ball(&mut game, (10.0, FIELD_HEIGHT + BALL_RADIUS + 1.0), (0.0, 240.0));
            game.step();
            assert_eq!(game.lives, expected);
            if expected > 0 {
                assert_eq!(game.phase, Phase::Serving);
                game.launch();
            }
        }
        assert_eq!(game.phase, Phase::GameOver);
        game.update(1.0);
        assert_eq!(game.phase, Phase::GameOver);
    }

    #[test]
    fn caught_capsules_apply() {
        let mut game = playing(7);
        let at_paddle = Vector2::new(game.paddle_x, PADDLE_Y);

        game.drop_capsule(CapsuleKind::WidePaddle, at_paddle);
        game.drop_capsule(CapsuleKind::SlowBall, at_paddle);
        game.drop_capsule(CapsuleKind::ExtraLife, at_paddle);
        game.drop_capsule(CapsuleKind::MultiBall, at_paddle);
        game.step();

        assert!(game.capsules.is_empty());
        assert_eq!(game.paddle_width(), PADDLE_WIDTH * 1.5);
        assert_eq!(game.speed_factor(), SLOW_FACTOR);
        assert_eq!(game.lives, START_LIVES + 1);
        assert_eq!(game.balls.len(), 3);
    }

    #[test]
    fn missed_capsules_fall_away() {
        let mut game = playing(8);
        game.paddle_x = PADDLE_WIDTH;
        game.drop_capsule(CapsuleKind::ExtraLife, Vector2::new(FIELD_WIDTH - 20.0, FIELD_HEIGHT));
        for _ in 0..60 {
            game.step();
        }
        assert!(game.capsules.is_empty());
        assert_eq!(game.lives, START_LIVES);
    }

    #[test]
    fn multi_ball_is_capped() {
        let mut game = playing(9);
        for _ in 0..5 {
            game.apply(CapsuleKind::MultiBall);
        }
        assert_eq!(game.balls.len(), MAX_BALLS);
    }

    #[test]
    fn clearing_the_field_advances_level() {
        let mut game = playing(10);
        let last = game.bricks[0];
        game.bricks = vec![last];
        game.damage_brick(0);
        game.step();
        assert_eq!(game.level, 2);
        assert_eq!(game.phase, Phase::Serving);
        assert!(!game.bricks.is_empty());
        assert!(game.ball_speed() > BASE_BALL_SPEED);
    }

    #[test]
    fn pause_freezes_the_world() {
        let mut game = playing(11);
        game.toggle_pause();
        let before = game.balls.clone();
        game.update(0.5);
        assert_eq!(game.balls, before);
        game.toggle_pause();
        game.update(0.1);
        assert_ne!(game.balls, before);
    }
}
