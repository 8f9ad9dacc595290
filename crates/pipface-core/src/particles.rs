//! Transient visual effects: hearts, bubbles, zzz and friends.
//!
//! Particles live in canvas pixel space (y grows downward). The collection is
//! flat, insertion ordered, and owned here; nothing outside keeps references.

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Particle life range in seconds. Max life is set equal to the rolled life,
/// so opacity starts at 1.0 and reaches 0 exactly at expiry.
const LIFE_RANGE: (f32, f32) = (1.5, 2.5);

/// Horizontal jitter around the emission origin.
const ORIGIN_JITTER: f32 = 30.0;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticleKind {
    Heart,
    Question,
    Exclaim,
    Dots,
    Star,
    Sweat,
    Zzz,
    Gear,
    Bubble,
    /// Any other text is drawn as-is.
    Custom(String),
}

/// Longest custom symbol kept, in chars.
const CUSTOM_SYMBOL_MAX: usize = 4;

impl ParticleKind {
    pub fn parse(name: &str) -> Self {
        match name.trim() {
            "heart" => Self::Heart,
            "question" => Self::Question,
            "exclaim" => Self::Exclaim,
            "dots" => Self::Dots,
            "star" => Self::Star,
            "sweat" => Self::Sweat,
            "zzz" => Self::Zzz,
            "gear" => Self::Gear,
            "bubble" => Self::Bubble,
            other => Self::Custom(other.chars().take(CUSTOM_SYMBOL_MAX).collect()),
        }
    }

    pub fn symbol(&self) -> &str {
        match self {
            Self::Heart => "♥",
            Self::Question => "?",
            Self::Exclaim => "!",
            Self::Dots => "...",
            Self::Star => "★",
            Self::Sweat => "💧",
            Self::Zzz => "Z",
            Self::Gear => "⚙",
            Self::Bubble => "○",
            Self::Custom(s) => s.as_str(),
        }
    }

    pub fn color(&self) -> (u8, u8, u8) {
        match self {
            Self::Heart => (255, 100, 150),
            Self::Question => (100, 150, 255),
            Self::Exclaim => (255, 200, 50),
            Self::Dots => (60, 60, 60),
            Self::Star => (255, 230, 100),
            Self::Sweat => (100, 200, 255),
            Self::Zzz => (150, 150, 200),
            Self::Gear => (150, 150, 150),
            Self::Bubble => (100, 100, 120),
            Self::Custom(_) => (200, 200, 200),
        }
    }

    fn motion(&self) -> Motion {
        match self {
            Self::Bubble => Motion {
                vx: (-15.0, 15.0),
                vy: (-80.0, -40.0),
                size: (12.0, 24.0),
                drift: -50.0,
            },
            Self::Zzz => Motion {
                vx: (10.0, 30.0),
                vy: (-40.0, -20.0),
                size: (14.0, 26.0),
                drift: -30.0,
            },
            Self::Sweat => Motion {
                vx: (-20.0, 20.0),
                vy: (20.0, 50.0),
                size: (14.0, 22.0),
                drift: 60.0,
            },
            _ => Motion {
                vx: (-30.0, 30.0),
                vy: (40.0, 80.0),
                size: (16.0, 28.0),
                drift: -50.0,
            },
        }
    }
}

/// Class-specific launch ranges plus constant vertical acceleration
/// (negative rises on screen).
struct Motion {
    vx: (f32, f32),
    vy: (f32, f32),
    size: (f32, f32),
    drift: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Particle {
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    pub life: f32,
    pub max_life: f32,
    pub kind: ParticleKind,
    pub size: f32,
    drift: f32,
}

impl Particle {
    pub fn new(x: f32, y: f32, vx: f32, vy: f32, life: f32, kind: ParticleKind, size: f32) -> Self {
        let drift = kind.motion().drift;
        Self {
            x,
            y,
            vx,
            vy,
            life,
            max_life: life,
            kind,
            size,
            drift,
        }
    }

    /// Linear in remaining life: 1.0 at birth, 0.0 at expiry.
    pub fn opacity(&self) -> f32 {
        if self.max_life <= 0.0 {
            return 0.0;
        }
        (self.life / self.max_life).clamp(0.0, 1.0)
    }

    pub fn is_expired(&self) -> bool {
        self.life <= 0.0
    }

    fn advance(&mut self, dt: f32) {
        self.x += self.vx * dt;
        self.y += self.vy * dt;
        self.vy += self.drift * dt;
        self.life = (self.life - dt).max(0.0);
    }
}

fn roll<R: Rng>(rng: &mut R, (lo, hi): (f32, f32)) -> f32 {
    if hi > lo {
        rng.gen_range(lo..hi)
    } else {
        lo
    }
}

/// Owns every live particle. Capped at `max_particles`, oldest evicted first.
#[derive(Debug, Clone)]
pub struct ParticleSystem {
    particles: Vec<Particle>,
    max_particles: usize,
}

impl ParticleSystem {
    pub fn new(max_particles: usize) -> Self {
        Self {
            particles: Vec::new(),
            max_particles,
        }
    }

    /// Spawn `count` particles of `kind` around the origin.
    pub fn emit<R: Rng>(&mut self, rng: &mut R, x: f32, y: f32, kind: &ParticleKind, count: usize) {
        let motion = kind.motion();
        for _ in 0..count {
            let particle = Particle::new(
                x + rng.gen_range(-ORIGIN_JITTER..ORIGIN_JITTER),
                y,
                roll(rng, motion.vx),
                roll(rng, motion.vy),
                roll(rng, LIFE_RANGE),
                kind.clone(),
                roll(rng, motion.size),
            );
            self.push(particle);
        }
    }

    /// Insert a fully specified particle, evicting the oldest past the cap.
    pub fn push(&mut self, particle: Particle) {
        self.particles.push(particle);
        if self.particles.len() > self.max_particles {
            let excess = self.particles.len() - self.max_particles;
            self.particles.drain(..excess);
        }
    }

    /// Drop particles that expired on the previous tick, then advance the rest.
    /// A particle whose life hits zero stays one tick at opacity 0 so the
    /// renderer sees it fade out completely.
    pub fn tick(&mut self, dt: f32) {
        self.particles.retain(|p| !p.is_expired());
        for p in &mut self.particles {
            p.advance(dt);
        }
    }

    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    pub fn len(&self) -> usize {
        self.particles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    pub fn count_of(&self, kind: &ParticleKind) -> usize {
        self.particles.iter().filter(|p| &p.kind == kind).count()
    }
}
