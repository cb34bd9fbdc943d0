//! Named bit-field layouts over a fixed-width word.
//!
//! A [`Layout`] describes how an instruction category packs its operands
//! into a word. Variants extend their parent category by cloning it with
//! [`Layout::subtype`] and adding fields, so a parent layout is never
//! mutated after the fact. Get and set are pure: they only read from or
//! produce a new target word.

use core::fmt;

use crate::types::Word;

/// A contiguous bit range inside a word. Bit 0 is the LSB.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Field {
    start: u8,
    size: u8,
}

impl Field {
    /// First bit of the field.
    pub const fn start(&self) -> u8 {
        self.start
    }

    /// Width of the field in bits.
    pub const fn size(&self) -> u8 {
        self.size
    }

    /// Last bit of the field, inclusive.
    pub const fn stop(&self) -> u8 {
        self.start + self.size - 1
    }

    /// Largest value the field can hold.
    pub const fn max(&self) -> Word {
        if self.size as usize >= crate::WORD_BITS {
            Word::MAX
        } else {
            (1 << self.size) - 1
        }
    }

    /// Extract the field value from `word`.
    pub const fn get(&self, word: Word) -> Word {
        (word >> self.start) & self.max()
    }

    const fn overlaps(&self, other: &Field) -> bool {
        self.start <= other.stop() && other.start <= self.stop()
    }
}

/// A named set of non-overlapping (unless explicitly allowed) fields over
/// a word of `width` bits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    width: u8,
    fields: Vec<(&'static str, Field)>,
}

impl Layout {
    /// Empty layout over a word of `width` bits.
    pub const fn new(width: u8) -> Self {
        Self {
            width,
            fields: Vec::new(),
        }
    }

    /// Clone this layout so a variant can add fields without touching the
    /// parent.
    pub fn subtype(&self) -> Self {
        self.clone()
    }

    /// Add a field, rejecting ranges that fall outside the word or
    /// intersect an existing field.
    pub fn with_field(self, name: &'static str, start: u8, size: u8) -> Result<Self, LayoutError> {
        self.add(name, start, size, false)
    }

    /// Add a field that is allowed to intersect existing fields.
    pub fn with_overlapping_field(
        self,
        name: &'static str,
        start: u8,
        size: u8,
    ) -> Result<Self, LayoutError> {
        self.add(name, start, size, true)
    }

    fn add(
        mut self,
        name: &'static str,
        start: u8,
        size: u8,
        overlap: bool,
    ) -> Result<Self, LayoutError> {
        if size == 0 || start as usize + size as usize > self.width as usize {
            return Err(LayoutError::OutOfBounds { name, start, size });
        }

        let field = Field { start, size };

        if !overlap {
            if let Some(&(existing, _)) = self
                .fields
                .iter()
                .find(|(_, other)| field.overlaps(other))
            {
                return Err(LayoutError::Overlap { name, existing });
            }
        }

        self.fields.push((name, field));

        Ok(self)
    }

    /// Look up a field by name.
    pub fn field(&self, name: &str) -> Result<Field, LayoutError> {
        self.fields
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, f)| *f)
            .ok_or(LayoutError::UnknownField {
                name: name.to_owned(),
            })
    }

    /// Extract the named field from `word`.
    pub fn get(&self, word: Word, name: &str) -> Result<Word, LayoutError> {
        Ok(self.field(name)?.get(word))
    }

    /// Produce a copy of `word` with the named field set to `value`.
    ///
    /// Fails when `value` exceeds the field mask.
    pub fn set(&self, word: Word, name: &'static str, value: Word) -> Result<Word, LayoutError> {
        let field = self.field(name)?;

        if value > field.max() {
            return Err(LayoutError::Overflow {
                name,
                value,
                max: field.max(),
            });
        }

        let cleared = word & !(field.max() << field.start());

        Ok(cleared | (value << field.start()))
    }
}

/// Errors raised while defining or using a [`Layout`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayoutError {
    /// The field range falls outside the word.
    OutOfBounds {
        /// Name of the rejected field.
        name: &'static str,
        /// First bit of the rejected range.
        start: u8,
        /// Width of the rejected range.
        size: u8,
    },
    /// The field range intersects an already defined field.
    Overlap {
        /// Name of the rejected field.
        name: &'static str,
        /// Name of the field it collides with.
        existing: &'static str,
    },
    /// The value does not fit in the field.
    Overflow {
        /// Name of the target field.
        name: &'static str,
        /// Value that was being assigned.
        value: Word,
        /// Largest value the field can hold.
        max: Word,
    },
    /// No field with that name exists in the layout.
    UnknownField {
        /// The name that failed to resolve.
        name: String,
    },
}

impl fmt::Display for LayoutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfBounds { name, start, size } => {
                write!(f, "field '{name}' [{start}, +{size}) extends beyond the word")
            }
            Self::Overlap { name, existing } => {
                write!(f, "field '{name}' overlaps with existing field '{existing}'")
            }
            Self::Overflow { name, value, max } => {
                write!(f, "cannot assign {value} to '{name}', can be at most {max}")
            }
            Self::UnknownField { name } => write!(f, "'{name}' is not a field of this layout"),
        }
    }
}

impl std::error::Error for LayoutError {}
