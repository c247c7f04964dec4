/// Byte alignment and capacity growth helpers.
///
/// Uniform blocks addressed through dynamic offsets must start on a
/// multiple of the device's `minUniformBufferOffsetAlignment`, which Vulkan
/// guarantees to be a power of two.

/// Round `value` up to the next multiple of `alignment`.
///
/// An alignment of 0 or 1 leaves the value unchanged.
///
/// # Panics
///
/// Panics if `alignment` is not a power of two.
pub fn align_up(value: u64, alignment: u64) -> u64 {
    if alignment <= 1 {
        return value;
    }
    assert!(
        alignment.is_power_of_two(),
        "alignment must be a power of two, got {}",
        alignment
    );
    (value + alignment - 1) & !(alignment - 1)
}

/// Smallest power of two greater than or equal to `value` (1 for 0).
pub fn next_power_of_two(value: u32) -> u32 {
    value.max(1).next_power_of_two()
}

/// How a growable buffer picks its new capacity when it runs out of room
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GrowthPolicy {
    /// Round the required capacity up to the next power of two
    #[default]
    Exponential,
    /// Grow to exactly the required capacity
    Exact,
}

impl GrowthPolicy {
    /// Capacity to allocate so that at least `required` elements fit
    pub fn capacity_for(&self, required: u32) -> u32 {
        match self {
            GrowthPolicy::Exponential => next_power_of_two(required),
            GrowthPolicy::Exact => required,
        }
    }
}

#[cfg(test)]
#[path = "alignment_tests.rs"]
mod tests;
