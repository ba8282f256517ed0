//! Decomposition parameters and their validation rules.

use crate::canvas::{Background, BlendMode};
use crate::error::PicgleError;

/// Partition strategy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Shape {
    #[default]
    Blocks,
    Voronoi,
}

impl Shape {
    /// Lowercase token used in output file and folder names.
    pub fn name(&self) -> &'static str {
        match self {
            Shape::Blocks => "blocks",
            Shape::Voronoi => "voronoi",
        }
    }

    pub fn from_name(name: &str) -> Option<Shape> {
        match name.to_lowercase().as_str() {
            "blocks" | "block" => Some(Shape::Blocks),
            "voronoi" => Some(Shape::Voronoi),
            _ => None,
        }
    }
}

/// Backdrop baked into every decomposed layer. Also picks the blend mode
/// that makes the pieces stack back into the original: layers on a light
/// backdrop recombine with multiply, layers on black with screen.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum BackgroundType {
    #[default]
    Transparent,
    White,
    Black,
}

impl BackgroundType {
    pub fn name(&self) -> &'static str {
        match self {
            BackgroundType::Transparent => "transparent",
            BackgroundType::White => "white",
            BackgroundType::Black => "black",
        }
    }

    pub fn from_name(name: &str) -> Option<BackgroundType> {
        match name.to_lowercase().as_str() {
            "transparent" => Some(BackgroundType::Transparent),
            "white" => Some(BackgroundType::White),
            "black" => Some(BackgroundType::Black),
            _ => None,
        }
    }

    /// The fill poured into each layer buffer before pixels are assigned.
    pub fn layer_fill(&self) -> Background {
        match self {
            BackgroundType::Transparent => Background::Transparent,
            BackgroundType::White => Background::WHITE,
            BackgroundType::Black => Background::BLACK,
        }
    }

    /// The blend mode under which the layers recombine into the source.
    pub fn recombine_mode(&self) -> BlendMode {
        match self {
            BackgroundType::Transparent | BackgroundType::White => BlendMode::Multiply,
            BackgroundType::Black => BlendMode::Screen,
        }
    }
}

pub const MIN_PIECES: u32 = 5;
pub const MAX_PIECES: u32 = 15;
pub const MAX_PIECES_UNLOCKED: u32 = 100;
pub const MIN_SEEDS: u32 = 500;
pub const MAX_SEEDS: u32 = 10_000;

/// Parameters for one decomposition run.
///
/// `block_size` only applies to [`Shape::Blocks`]; `num_seeds` only to
/// [`Shape::Voronoi`]. The unused field is ignored by validation.
#[derive(Clone, Debug)]
pub struct DecomposeConfig {
    pub shape: Shape,
    pub num_pieces: u32,
    pub block_size: u32,
    pub num_seeds: u32,
    pub background: BackgroundType,
    pub invert_colors: bool,
    pub include_watermark: bool,
}

impl Default for DecomposeConfig {
    fn default() -> Self {
        Self {
            shape: Shape::Blocks,
            num_pieces: MIN_PIECES,
            block_size: 20,
            num_seeds: 1000,
            background: BackgroundType::Transparent,
            invert_colors: false,
            include_watermark: true,
        }
    }
}

impl DecomposeConfig {
    /// Check every numeric bound. `advanced_unlocked` raises the piece-count
    /// ceiling from 15 to 100. Runs before any pixel work.
    pub fn validate(&self, advanced_unlocked: bool) -> Result<(), PicgleError> {
        let max_pieces = if advanced_unlocked {
            MAX_PIECES_UNLOCKED
        } else {
            MAX_PIECES
        };
        if self.num_pieces < MIN_PIECES || self.num_pieces > max_pieces {
            return Err(PicgleError::Validation(format!(
                "number of pieces must be between {} and {} (got {})",
                MIN_PIECES, max_pieces, self.num_pieces
            )));
        }
        match self.shape {
            Shape::Blocks => {
                if self.block_size < 1 {
                    return Err(PicgleError::Validation(format!(
                        "block size must be at least 1 (got {})",
                        self.block_size
                    )));
                }
            }
            Shape::Voronoi => {
                if self.num_seeds < MIN_SEEDS || self.num_seeds > MAX_SEEDS {
                    return Err(PicgleError::Validation(format!(
                        "seed count must be between {} and {} (got {})",
                        MIN_SEEDS, MAX_SEEDS, self.num_seeds
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> DecomposeConfig {
        DecomposeConfig::default()
    }

    #[test]
    fn piece_count_bounds() {
        let mut c = cfg();
        c.num_pieces = 4;
        assert!(c.validate(false).is_err());
        c.num_pieces = 5;
        assert!(c.validate(false).is_ok());
        c.num_pieces = 15;
        assert!(c.validate(false).is_ok());
        c.num_pieces = 16;
        assert!(c.validate(false).is_err());
    }

    #[test]
    fn unlock_raises_piece_ceiling() {
        let mut c = cfg();
        c.num_pieces = 16;
        assert!(c.validate(true).is_ok());
        c.num_pieces = 100;
        assert!(c.validate(true).is_ok());
        c.num_pieces = 101;
        assert!(c.validate(true).is_err());
    }

    #[test]
    fn seed_count_bounds_apply_to_voronoi_only() {
        let mut c = cfg();
        c.shape = Shape::Voronoi;
        c.num_seeds = 499;
        assert!(c.validate(false).is_err());
        c.num_seeds = 500;
        assert!(c.validate(false).is_ok());
        c.num_seeds = 10_000;
        assert!(c.validate(false).is_ok());
        c.num_seeds = 10_001;
        assert!(c.validate(false).is_err());

        // Same out-of-range seed count is fine under the block strategy
        c.shape = Shape::Blocks;
        c.num_seeds = 499;
        assert!(c.validate(false).is_ok());
    }

    #[test]
    fn block_size_must_be_positive() {
        let mut c = cfg();
        c.block_size = 0;
        assert!(c.validate(false).is_err());
        c.block_size = 1;
        assert!(c.validate(false).is_ok());
    }

    #[test]
    fn validation_errors_name_the_bound() {
        let mut c = cfg();
        c.num_pieces = 200;
        let msg = c.validate(false).unwrap_err().to_string();
        assert!(msg.contains("between 5 and 15"));
        assert!(msg.contains("200"));
    }

    #[test]
    fn background_picks_recombine_mode() {
        assert_eq!(BackgroundType::Transparent.recombine_mode(), BlendMode::Multiply);
        assert_eq!(BackgroundType::White.recombine_mode(), BlendMode::Multiply);
        assert_eq!(BackgroundType::Black.recombine_mode(), BlendMode::Screen);
    }
}
