//! Block registry: maps compact [`BlockId`] bytes to [`BlockDef`] metadata.
//!
//! Air is always ID 0 so that zero-initialized chunk memory represents empty
//! space. The generator classifies materials and the mesher decides face
//! visibility through the query methods here; neither owns the content.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Compact identifier stored in every block cell (1 byte).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockId(pub u8);

impl BlockId {
    pub const AIR: BlockId = BlockId(0);
    pub const NULLBLOCK: BlockId = BlockId(1);
    pub const STONE: BlockId = BlockId(2);
    pub const DIRT: BlockId = BlockId(3);
    pub const GRASS: BlockId = BlockId(4);
    pub const SAND: BlockId = BlockId(5);
    pub const GRAVEL: BlockId = BlockId(6);
    pub const WATER: BlockId = BlockId(7);
    pub const LOG: BlockId = BlockId(8);
    pub const LEAVES: BlockId = BlockId(9);
    pub const GLASS: BlockId = BlockId(10);
    pub const FLOWER: BlockId = BlockId(11);

    /// Returns `true` for the empty block.
    pub fn is_air(self) -> bool {
        self.0 == 0
    }
}

/// Transparency mode for a block type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Transparency {
    /// Fully hides whatever is behind it.
    Opaque,
    /// See-through but still has a visible surface (glass, leaves).
    Transparent,
    /// Liquid surface rendered in its own pass.
    Water,
    /// No surface at all (air).
    Empty,
}

/// Full descriptor for a block type.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BlockDef {
    /// Human-readable name (e.g. "stone", "grass", "water").
    pub name: String,
    /// Whether entities collide with this block.
    pub solid: bool,
    /// Transparency mode.
    pub transparency: Transparency,
    /// Non-cube geometry; excluded from greedy merging.
    pub custom_model: bool,
}

impl BlockDef {
    pub fn new(name: &str, solid: bool, transparency: Transparency) -> Self {
        Self {
            name: name.to_string(),
            solid,
            transparency,
            custom_model: false,
        }
    }
}

/// Errors that can occur during block registration.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// A type with the same name has already been registered.
    #[error("duplicate block name: {0}")]
    DuplicateName(String),
    /// All 256 slots have been consumed.
    #[error("block registry is full (max 256 types)")]
    RegistryFull,
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Maps [`BlockId`] → [`BlockDef`] with O(1) lookup by index and by name.
#[derive(Clone, Debug)]
pub struct BlockRegistry {
    /// Dense array where `index == BlockId.0`.
    blocks: Vec<BlockDef>,
    name_to_id: HashMap<String, BlockId>,
}

impl BlockRegistry {
    /// Creates a registry containing only air.
    pub fn new() -> Self {
        let mut name_to_id = HashMap::new();
        name_to_id.insert("air".to_string(), BlockId::AIR);
        Self {
            blocks: vec![BlockDef::new("air", false, Transparency::Empty)],
            name_to_id,
        }
    }

    /// The built-in block set, with IDs matching the [`BlockId`] constants.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        let defaults = [
            BlockDef::new("nullblock", true, Transparency::Opaque),
            BlockDef::new("stone", true, Transparency::Opaque),
            BlockDef::new("dirt", true, Transparency::Opaque),
            BlockDef::new("grass", true, Transparency::Opaque),
            BlockDef::new("sand", true, Transparency::Opaque),
            BlockDef::new("gravel", true, Transparency::Opaque),
            BlockDef::new("water", false, Transparency::Water),
            BlockDef::new("log", true, Transparency::Opaque),
            BlockDef::new("leaves", true, Transparency::Transparent),
            BlockDef::new("glass", true, Transparency::Transparent),
            BlockDef {
                custom_model: true,
                ..BlockDef::new("flower", false, Transparency::Transparent)
            },
        ];
        for def in defaults {
            // Fresh registry with unique names: cannot fail.
            if let Err(e) = registry.register(def) {
                tracing::error!("default block registration failed: {e}");
            }
        }
        registry
    }

    /// Registers a new block type and returns its assigned ID.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateName`] if the name is taken, or
    /// [`RegistryError::RegistryFull`] once 256 types exist.
    pub fn register(&mut self, def: BlockDef) -> Result<BlockId, RegistryError> {
        if self.name_to_id.contains_key(&def.name) {
            return Err(RegistryError::DuplicateName(def.name));
        }
        if self.blocks.len() > u8::MAX as usize {
            return Err(RegistryError::RegistryFull);
        }
        let id = BlockId(self.blocks.len() as u8);
        self.name_to_id.insert(def.name.clone(), id);
        self.blocks.push(def);
        Ok(id)
    }

    /// Returns the definition for `id`, or `None` if unregistered.
    pub fn get(&self, id: BlockId) -> Option<&BlockDef> {
        self.blocks.get(id.0 as usize)
    }

    /// Returns the ID for a named block, or `None` if not found.
    pub fn lookup_by_name(&self, name: &str) -> Option<BlockId> {
        self.name_to_id.get(name).copied()
    }

    /// Number of registered types, including air.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Returns `true` if only air is registered.
    pub fn is_empty(&self) -> bool {
        self.blocks.len() <= 1
    }

    /// Transparency of `id`. Unknown IDs are treated like air.
    pub fn transparency(&self, id: BlockId) -> Transparency {
        self.get(id)
            .map_or(Transparency::Empty, |def| def.transparency)
    }

    pub fn is_solid(&self, id: BlockId) -> bool {
        self.get(id).is_some_and(|def| def.solid)
    }

    /// Returns `true` unless the block is opaque.
    pub fn is_transparent(&self, id: BlockId) -> bool {
        self.transparency(id) != Transparency::Opaque
    }

    pub fn has_custom_model(&self, id: BlockId) -> bool {
        self.get(id).is_some_and(|def| def.custom_model)
    }
}

impl Default for BlockRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_air_is_id_zero() {
        let registry = BlockRegistry::new();
        assert_eq!(registry.lookup_by_name("air"), Some(BlockId::AIR));
        assert_eq!(registry.transparency(BlockId::AIR), Transparency::Empty);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_defaults_match_constants() {
        let registry = BlockRegistry::with_defaults();
        let expected = [
            ("nullblock", BlockId::NULLBLOCK),
            ("stone", BlockId::STONE),
            ("dirt", BlockId::DIRT),
            ("grass", BlockId::GRASS),
            ("sand", BlockId::SAND),
            ("gravel", BlockId::GRAVEL),
            ("water", BlockId::WATER),
            ("log", BlockId::LOG),
            ("leaves", BlockId::LEAVES),
            ("glass", BlockId::GLASS),
            ("flower", BlockId::FLOWER),
        ];
        for (name, id) in expected {
            assert_eq!(registry.lookup_by_name(name), Some(id), "id for {name}");
        }
        assert_eq!(registry.len(), 12);
    }

    #[test]
    fn test_classification_queries() {
        let registry = BlockRegistry::with_defaults();
        assert!(registry.is_solid(BlockId::STONE));
        assert!(!registry.is_transparent(BlockId::STONE));
        assert!(registry.is_transparent(BlockId::GLASS));
        assert_eq!(registry.transparency(BlockId::WATER), Transparency::Water);
        assert!(!registry.is_solid(BlockId::WATER));
        assert!(registry.has_custom_model(BlockId::FLOWER));
        assert!(!registry.has_custom_model(BlockId::GRASS));
    }

    #[test]
    fn test_unknown_id_behaves_like_air() {
        let registry = BlockRegistry::with_defaults();
        let unknown = BlockId(200);
        assert!(registry.get(unknown).is_none());
        assert_eq!(registry.transparency(unknown), Transparency::Empty);
        assert!(!registry.is_solid(unknown));
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut registry = BlockRegistry::with_defaults();
        let result = registry.register(BlockDef::new("stone", true, Transparency::Opaque));
        assert!(matches!(result, Err(RegistryError::DuplicateName(_))));
    }

    #[test]
    fn test_registry_full_after_256_types() {
        let mut registry = BlockRegistry::new();
        for i in 1..256 {
            registry
                .register(BlockDef::new(&format!("block_{i}"), true, Transparency::Opaque))
                .expect("registration should succeed below capacity");
        }
        let result = registry.register(BlockDef::new("overflow", true, Transparency::Opaque));
        assert!(matches!(result, Err(RegistryError::RegistryFull)));
    }
}
