use std::collections::BTreeSet;

use serde::Deserialize;
use thiserror::Error;

use crate::model::ids::{CharacterId, ModuleId};

const HIRAGANA: &str = "あいうえおかきくけこさしすせそたちつてとなにぬねのはひふへほまみむめもやゆよらりるれろわをん";
const KATAKANA: &str = "アイウエオカキクケコサシスセソタチツテトナニヌネノハヒフヘホマミムメモヤユヨラリルレロワヲン";
const KANJI_GRADE_ONE: &str = "一右雨円王音下火花貝学気九休玉金空月犬見五口校左三山子四糸字耳七車手十出女小上森人水正生青夕石赤千川先早草足村大男竹中虫町天田土二日入年白八百文木本名目立力林六";

//
// ─── ERRORS ───────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CatalogError {
    #[error("catalog has no modules")]
    Empty,

    #[error("module `{0}` is declared more than once")]
    DuplicateModule(ModuleId),

    #[error("module `{0}` has no characters")]
    EmptyModule(ModuleId),

    #[error("invalid catalog document: {0}")]
    Parse(String),
}

//
// ─── MODULE DEFINITION ────────────────────────────────────────────────────────
//

/// A named character set and the identifiers of every character in it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleDef {
    id: ModuleId,
    name: String,
    characters: BTreeSet<CharacterId>,
}

impl ModuleDef {
    /// Build a module definition.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::EmptyModule` if `characters` yields nothing.
    pub fn new(
        id: ModuleId,
        name: impl Into<String>,
        characters: impl IntoIterator<Item = CharacterId>,
    ) -> Result<Self, CatalogError> {
        let characters: BTreeSet<CharacterId> = characters.into_iter().collect();
        if characters.is_empty() {
            return Err(CatalogError::EmptyModule(id));
        }
        Ok(Self {
            id,
            name: name.into(),
            characters,
        })
    }

    fn from_glyphs(id: &str, name: &str, glyphs: &str) -> Result<Self, CatalogError> {
        Self::new(
            ModuleId::new(id),
            name,
            glyphs.chars().map(|c| CharacterId::new(c.to_string())),
        )
    }

    #[must_use]
    pub fn id(&self) -> &ModuleId {
        &self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn characters(&self) -> &BTreeSet<CharacterId> {
        &self.characters
    }

    #[must_use]
    pub fn total_characters(&self) -> usize {
        self.characters.len()
    }

    #[must_use]
    pub fn contains(&self, character: &CharacterId) -> bool {
        self.characters.contains(character)
    }
}

//
// ─── CATALOG ──────────────────────────────────────────────────────────────────
//

/// Static configuration of every recognized module, in display order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleCatalog {
    modules: Vec<ModuleDef>,
}

#[derive(Deserialize)]
struct CatalogDocument {
    modules: Vec<ModuleDocument>,
}

#[derive(Deserialize)]
struct ModuleDocument {
    id: ModuleId,
    #[serde(default)]
    name: Option<String>,
    characters: Vec<CharacterId>,
}

impl ModuleCatalog {
    /// Build a catalog from module definitions.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Empty` when no modules are given and
    /// `CatalogError::DuplicateModule` when two modules share an id.
    pub fn new(modules: Vec<ModuleDef>) -> Result<Self, CatalogError> {
        if modules.is_empty() {
            return Err(CatalogError::Empty);
        }
        let mut seen = BTreeSet::new();
        for module in &modules {
            if !seen.insert(module.id()) {
                return Err(CatalogError::DuplicateModule(module.id().clone()));
            }
        }
        Ok(Self { modules })
    }

    /// The character sets shipped with the app: basic hiragana, basic
    /// katakana and the first-grade kanji.
    #[must_use]
    pub fn japanese() -> Self {
        let modules = [
            ("hiragana", "Hiragana", HIRAGANA),
            ("katakana", "Katakana", KATAKANA),
            ("kanji", "Kanji", KANJI_GRADE_ONE),
        ]
        .into_iter()
        .filter_map(|(id, name, glyphs)| ModuleDef::from_glyphs(id, name, glyphs).ok())
        .collect();
        Self { modules }
    }

    /// Parse a catalog from a TOML document of `[[modules]]` tables.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Parse` for malformed TOML and the validation
    /// errors of [`ModuleCatalog::new`] / [`ModuleDef::new`].
    pub fn from_toml_str(raw: &str) -> Result<Self, CatalogError> {
        let doc: CatalogDocument =
            toml::from_str(raw).map_err(|err| CatalogError::Parse(err.to_string()))?;
        let modules = doc
            .modules
            .into_iter()
            .map(|m| {
                let name = m.name.unwrap_or_else(|| m.id.to_string());
                ModuleDef::new(m.id, name, m.characters)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(modules)
    }

    #[must_use]
    pub fn get(&self, id: &ModuleId) -> Option<&ModuleDef> {
        self.modules.iter().find(|m| m.id() == id)
    }

    #[must_use]
    pub fn modules(&self) -> &[ModuleDef] {
        &self.modules
    }

    pub fn module_ids(&self) -> impl Iterator<Item = &ModuleId> {
        self.modules.iter().map(ModuleDef::id)
    }

    #[must_use]
    pub fn total_characters(&self, id: &ModuleId) -> Option<usize> {
        self.get(id).map(ModuleDef::total_characters)
    }

    #[must_use]
    pub fn contains(&self, module: &ModuleId, character: &CharacterId) -> bool {
        self.get(module).is_some_and(|m| m.contains(character))
    }
}

impl Default for ModuleCatalog {
    fn default() -> Self {
        Self::japanese()
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
