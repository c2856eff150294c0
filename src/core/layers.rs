//! Named render layers

/// Layer bit every new entity starts on
pub const DEFAULT_LAYER: u32 = 1;

/// Name of the layer at bit 0
pub const DEFAULT_LAYER_NAME: &str = "Default";

/// Mask matching every layer
pub const ALL_LAYERS: u32 = u32::MAX;

/// Maps layer names to single-bit 32-bit masks.
///
/// Bit 0 is always `"Default"`. Layers are assigned the lowest free bit.
#[derive(Debug, Clone)]
pub struct LayerRegistry {
    names: [Option<String>; 32],
}

impl LayerRegistry {
    #[must_use]
    pub fn new() -> Self {
        let mut names: [Option<String>; 32] = Default::default();
        names[0] = Some(DEFAULT_LAYER_NAME.to_string());
        Self { names }
    }

    /// Register a layer and return its bit. Returns the existing bit if the
    /// name is taken, or `None` when all 32 bits are in use.
    pub fn add_layer(&mut self, name: impl Into<String>) -> Option<u32> {
        let name = name.into();
        if let Some(bit) = self.get_layer_bit(&name) {
            return Some(bit);
        }

        let index = self.names.iter().position(Option::is_none)?;
        log::debug!("Layer '{name}' assigned bit {index}");
        self.names[index] = Some(name);
        Some(1 << index)
    }

    /// Remove a layer. The default layer cannot be removed.
    pub fn remove_layer(&mut self, name: &str) -> bool {
        match self.index_of(name) {
            Some(0) | None => false,
            Some(index) => {
                self.names[index] = None;
                true
            }
        }
    }

    /// Single-bit mask for a layer name
    #[must_use]
    pub fn get_layer_bit(&self, name: &str) -> Option<u32> {
        self.index_of(name).map(|index| 1 << index)
    }

    /// Name of the lowest layer set in `mask`
    #[must_use]
    pub fn name_of(&self, mask: u32) -> Option<&str> {
        if mask == 0 {
            return None;
        }
        self.names[mask.trailing_zeros() as usize].as_deref()
    }

    /// Combined mask of several layers; unknown names are ignored
    #[must_use]
    pub fn mask_of<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> u32 {
        names
            .into_iter()
            .filter_map(|name| self.get_layer_bit(name))
            .fold(0, |mask, bit| mask | bit)
    }

    /// Registered layers as `(name, bit)`, lowest bit first
    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.names
            .iter()
            .enumerate()
            .filter_map(|(index, name)| name.as_deref().map(|n| (n, 1u32 << index)))
    }

    fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n.as_deref() == Some(name))
    }
}

impl Default for LayerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
