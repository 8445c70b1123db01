//! Shapes, element types and physical layouts for HLO instructions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Element type of an array shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrimitiveType {
    Pred,
    S8,
    S16,
    S32,
    S64,
    U8,
    U16,
    U32,
    U64,
    F16,
    Bf16,
    F32,
    F64,
    C64,
    C128,
}

impl PrimitiveType {
    /// Storage width in bits. `Pred` occupies a single bit in registers.
    pub fn bit_width(self) -> u32 {
        match self {
            PrimitiveType::Pred => 1,
            PrimitiveType::S8 | PrimitiveType::U8 => 8,
            PrimitiveType::S16 | PrimitiveType::U16 | PrimitiveType::F16 | PrimitiveType::Bf16 => 16,
            PrimitiveType::S32 | PrimitiveType::U32 | PrimitiveType::F32 => 32,
            PrimitiveType::S64 | PrimitiveType::U64 | PrimitiveType::F64 | PrimitiveType::C64 => 64,
            PrimitiveType::C128 => 128,
        }
    }

    pub fn is_floating_point(self) -> bool {
        matches!(
            self,
            PrimitiveType::F16 | PrimitiveType::Bf16 | PrimitiveType::F32 | PrimitiveType::F64
        )
    }

    pub fn is_complex(self) -> bool {
        matches!(self, PrimitiveType::C64 | PrimitiveType::C128)
    }

    pub fn is_integral(self) -> bool {
        matches!(
            self,
            PrimitiveType::S8
                | PrimitiveType::S16
                | PrimitiveType::S32
                | PrimitiveType::S64
                | PrimitiveType::U8
                | PrimitiveType::U16
                | PrimitiveType::U32
                | PrimitiveType::U64
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            PrimitiveType::Pred => "pred",
            PrimitiveType::S8 => "s8",
            PrimitiveType::S16 => "s16",
            PrimitiveType::S32 => "s32",
            PrimitiveType::S64 => "s64",
            PrimitiveType::U8 => "u8",
            PrimitiveType::U16 => "u16",
            PrimitiveType::U32 => "u32",
            PrimitiveType::U64 => "u64",
            PrimitiveType::F16 => "f16",
            PrimitiveType::Bf16 => "bf16",
            PrimitiveType::F32 => "f32",
            PrimitiveType::F64 => "f64",
            PrimitiveType::C64 => "c64",
            PrimitiveType::C128 => "c128",
        }
    }

    /// Parse the lowercase name used in graph files and on the command line.
    pub fn from_name(name: &str) -> Option<Self> {
        let ty = match name.to_ascii_lowercase().as_str() {
            "pred" => PrimitiveType::Pred,
            "s8" => PrimitiveType::S8,
            "s16" => PrimitiveType::S16,
            "s32" => PrimitiveType::S32,
            "s64" => PrimitiveType::S64,
            "u8" => PrimitiveType::U8,
            "u16" => PrimitiveType::U16,
            "u32" => PrimitiveType::U32,
            "u64" => PrimitiveType::U64,
            "f16" => PrimitiveType::F16,
            "bf16" => PrimitiveType::Bf16,
            "f32" => PrimitiveType::F32,
            "f64" => PrimitiveType::F64,
            "c64" => PrimitiveType::C64,
            "c128" => PrimitiveType::C128,
            _ => return None,
        };
        Some(ty)
    }
}

impl fmt::Display for PrimitiveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Physical dimension ordering, listed from most-minor (fastest varying)
/// to most-major.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Layout {
    minor_to_major: Vec<usize>,
}

impl Layout {
    pub fn new(minor_to_major: Vec<usize>) -> Self {
        Self { minor_to_major }
    }

    /// Row-major layout: the last logical dimension is the most minor.
    pub fn default_for_rank(rank: usize) -> Self {
        Self {
            minor_to_major: (0..rank).rev().collect(),
        }
    }

    pub fn minor_to_major(&self) -> &[usize] {
        &self.minor_to_major
    }

    /// Position of `dim` in minor-to-major order.
    pub fn position_of(&self, dim: usize) -> Option<usize> {
        self.minor_to_major.iter().position(|&d| d == dim)
    }

    /// True if the layout lists every dimension `0..rank` exactly once.
    pub fn is_permutation_of(&self, rank: usize) -> bool {
        if self.minor_to_major.len() != rank {
            return false;
        }
        let mut seen = vec![false; rank];
        for &dim in &self.minor_to_major {
            if dim >= rank || seen[dim] {
                return false;
            }
            seen[dim] = true;
        }
        true
    }

    /// True if `dims` occupy an unbroken run of positions in memory order.
    ///
    /// An empty or single-element set is trivially consecutive. A dimension
    /// absent from the layout makes the set non-consecutive.
    pub fn are_dimensions_consecutive(&self, dims: &[usize]) -> bool {
        let mut positions = Vec::with_capacity(dims.len());
        for &dim in dims {
            match self.position_of(dim) {
                Some(pos) => positions.push(pos),
                None => return false,
            }
        }
        positions.sort_unstable();
        positions.windows(2).all(|w| w[1] == w[0] + 1)
    }
}

/// Array shape: element type, logical extents and physical layout.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "ShapeRepr", into = "ShapeRepr")]
pub struct Shape {
    element_type: PrimitiveType,
    dimensions: Vec<usize>,
    layout: Layout,
}

impl Shape {
    /// Shape with the default row-major layout.
    pub fn new(element_type: PrimitiveType, dimensions: Vec<usize>) -> Self {
        let layout = Layout::default_for_rank(dimensions.len());
        Self {
            element_type,
            dimensions,
            layout,
        }
    }

    /// Shape with an explicit minor-to-major layout.
    ///
    /// Returns `None` unless the layout is a permutation of the dimensions.
    pub fn with_layout(
        element_type: PrimitiveType,
        dimensions: Vec<usize>,
        minor_to_major: Vec<usize>,
    ) -> Option<Self> {
        let layout = Layout::new(minor_to_major);
        if !layout.is_permutation_of(dimensions.len()) {
            return None;
        }
        Some(Self {
            element_type,
            dimensions,
            layout,
        })
    }

    pub fn element_type(&self) -> PrimitiveType {
        self.element_type
    }

    pub fn dimensions(&self) -> &[usize] {
        &self.dimensions
    }

    pub fn dimension(&self, index: usize) -> Option<usize> {
        self.dimensions.get(index).copied()
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn rank(&self) -> usize {
        self.dimensions.len()
    }

    pub fn element_count(&self) -> usize {
        self.dimensions.iter().product()
    }

    /// True if any dimension has extent zero.
    pub fn is_zero_element(&self) -> bool {
        self.dimensions.iter().any(|&d| d == 0)
    }

    /// Keep only the dimensions for which `keep` holds, preserving their
    /// relative order. The layout is filtered the same way and renumbered.
    pub fn filter_dimensions(&self, keep: impl Fn(usize) -> bool) -> Shape {
        let kept: Vec<usize> = (0..self.rank()).filter(|&d| keep(d)).collect();
        let dimensions = kept.iter().map(|&d| self.dimensions[d]).collect();
        let minor_to_major = self
            .layout
            .minor_to_major()
            .iter()
            .filter_map(|d| kept.iter().position(|k| k == d))
            .collect();
        Shape {
            element_type: self.element_type,
            dimensions,
            layout: Layout::new(minor_to_major),
        }
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[", self.element_type)?;
        for (i, dim) in self.dimensions.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}", dim)?;
        }
        write!(f, "]{{")?;
        for (i, dim) in self.layout.minor_to_major().iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}", dim)?;
        }
        write!(f, "}}")
    }
}

/// On-disk form of a shape; the layout is optional and defaults to row-major.
#[derive(Serialize, Deserialize)]
struct ShapeRepr {
    element_type: PrimitiveType,
    dimensions: Vec<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    minor_to_major: Option<Vec<usize>>,
}

impl TryFrom<ShapeRepr> for Shape {
    type Error = String;

    fn try_from(repr: ShapeRepr) -> Result<Self, Self::Error> {
        match repr.minor_to_major {
            None => Ok(Shape::new(repr.element_type, repr.dimensions)),
            Some(m2m) => {
                let rank = repr.dimensions.len();
                Shape::with_layout(repr.element_type, repr.dimensions, m2m.clone()).ok_or_else(
                    || format!("layout {:?} is not a permutation of rank {}", m2m, rank),
                )
            }
        }
    }
}

impl From<Shape> for ShapeRepr {
    fn from(shape: Shape) -> Self {
        let default = Layout::default_for_rank(shape.rank());
        let minor_to_major = if shape.layout == default {
            None
        } else {
            Some(shape.layout.minor_to_major)
        };
        ShapeRepr {
            element_type: shape.element_type,
            dimensions: shape.dimensions,
            minor_to_major,
        }
    }
}
