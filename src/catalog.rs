//! Instrument catalog.
//!
//! Loads a SoundFont and exposes its presets in file order, along with the
//! lookup and fallback rules used to pick the initial voice.

use rustysynth::SoundFont;
use std::fmt;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Errors that can occur while loading an instrument bank.
#[derive(Debug, Error)]
pub enum CatalogLoadError {
    /// The bank file does not exist.
    #[error("SoundFont not found: {}", .0.display())]
    NotFound(PathBuf),
    /// The bank file exists but could not be read.
    #[error("failed to open SoundFont {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// The file is not a valid SoundFont.
    #[error("failed to parse SoundFont {}: {reason}", path.display())]
    Malformed { path: PathBuf, reason: String },
    /// The bank parsed but contains no usable presets.
    #[error("SoundFont contains no presets")]
    Empty,
}

/// A named instrument addressed by bank and program number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preset {
    /// Bank number.
    pub bank: u8,
    /// Program (patch) number.
    pub program: u8,
    /// Preset name as stored in the bank.
    pub name: String,
}

impl Preset {
    pub fn new(bank: u8, program: u8, name: impl Into<String>) -> Self {
        Self {
            bank,
            program,
            name: name.into(),
        }
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Bank {}, Program {}, Name: {}",
            self.bank, self.program, self.name
        )
    }
}

/// The outcome of resolving a user selection against the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution<'a> {
    /// The preset to use.
    pub preset: &'a Preset,
    /// True when the selection had no exact match and the default was used.
    pub fallback: bool,
}

/// Ordered, read-only list of presets. Never empty.
#[derive(Debug, Clone)]
pub struct Catalog {
    presets: Vec<Preset>,
}

impl Catalog {
    /// Creates a catalog from presets in file order.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogLoadError::Empty`] if `presets` is empty, since an
    /// empty catalog has no default preset.
    pub fn new(presets: Vec<Preset>) -> Result<Self, CatalogLoadError> {
        if presets.is_empty() {
            return Err(CatalogLoadError::Empty);
        }
        Ok(Self { presets })
    }

    /// Returns the presets in file order.
    pub fn presets(&self) -> &[Preset] {
        &self.presets
    }

    /// Returns the first preset with the given bank and program.
    pub fn find_exact(&self, bank: u8, program: u8) -> Option<&Preset> {
        self.presets
            .iter()
            .find(|p| p.bank == bank && p.program == program)
    }

    /// Returns the first preset in file order.
    ///
    /// This is the fallback for selections without an exact match. It is not
    /// "bank 0, program 0", which a bank is free to omit.
    pub fn default_preset(&self) -> &Preset {
        &self.presets[0]
    }

    /// Resolves a selection to a preset, falling back to
    /// [`default_preset`](Self::default_preset) when nothing matches.
    pub fn resolve(&self, bank: u8, program: u8) -> Resolution<'_> {
        match self.find_exact(bank, program) {
            Some(preset) => Resolution {
                preset,
                fallback: false,
            },
            None => Resolution {
                preset: self.default_preset(),
                fallback: true,
            },
        }
    }
}

/// A parsed SoundFont together with its catalog.
pub struct InstrumentBank {
    path: PathBuf,
    soundfont: Arc<SoundFont>,
    catalog: Catalog,
}

impl InstrumentBank {
    /// Loads and parses a SoundFont file.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SoundFont file (.sf2)
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - The file does not exist
    /// - The file cannot be read
    /// - The file is not a valid SoundFont, or holds no presets
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, CatalogLoadError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| {
            if source.kind() == io::ErrorKind::NotFound {
                CatalogLoadError::NotFound(path.to_path_buf())
            } else {
                CatalogLoadError::Io {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;

        let mut reader = BufReader::new(file);
        let soundfont =
            SoundFont::new(&mut reader).map_err(|e| CatalogLoadError::Malformed {
                path: path.to_path_buf(),
                reason: format!("{:?}", e),
            })?;

        let mut presets = Vec::with_capacity(soundfont.get_presets().len());
        for preset in soundfont.get_presets() {
            let bank = u8::try_from(preset.get_bank_number());
            let program = u8::try_from(preset.get_patch_number());
            match (bank, program) {
                (Ok(bank), Ok(program)) => {
                    presets.push(Preset::new(bank, program, preset.get_name()))
                }
                _ => warn!(
                    name = preset.get_name(),
                    bank = preset.get_bank_number(),
                    program = preset.get_patch_number(),
                    "Skipping preset with out of range bank or program."
                ),
            }
        }

        let catalog = Catalog::new(presets)?;
        info!(
            path = %path.display(),
            presets = catalog.presets().len(),
            "Loaded SoundFont."
        );

        Ok(Self {
            path: path.to_path_buf(),
            soundfont: Arc::new(soundfont),
            catalog,
        })
    }

    /// Returns the path the bank was loaded from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Returns the parsed SoundFont, for building the synthesizer.
    pub fn soundfont(&self) -> &Arc<SoundFont> {
        &self.soundfont
    }
}
