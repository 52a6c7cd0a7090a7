//! Topic path helpers.
//!
//! By convention the final `/`-separated segment of a topic is the address
//! of the device the reading belongs to.

/// Returns the device address encoded in a topic's final segment.
pub fn device_address(topic: &str) -> &str {
    topic.rsplit('/').next().unwrap_or("")
}
