//! System limits and configuration bounds.
//!
//! Every batch, payload and registration has an explicit maximum size.
//! This prevents unbounded growth and makes the system predictable.

/// Hard limits enforced by the partition processors.
///
/// Unlike [`crate::TopicConfig`], which is tuned per topic, limits are
/// system-wide ceilings that no configuration may exceed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Maximum number of elements in a single offer batch.
    pub max_batch_elements: u32,
    /// Maximum size of a single element payload in bytes.
    pub max_element_bytes: u32,
    /// Maximum number of elements returned by a single poll.
    pub max_poll_elements: u32,
    /// Maximum number of subscriber groups tracked per partition.
    pub max_subscriber_groups: u32,
    /// Maximum page capacity, in whichever unit the topic uses.
    pub max_page_capacity: u32,
}

impl Limits {
    /// Creates limits with safe defaults.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            // Batches: 10k elements, 1MB elements.
            max_batch_elements: 10_000,
            max_element_bytes: 1024 * 1024,
            max_poll_elements: 10_000,

            // Subscribers: 1000 groups per partition.
            max_subscriber_groups: 1000,

            // Pages: at most 64MB (or 64M elements).
            max_page_capacity: 64 * 1024 * 1024,
        }
    }

    /// Validates that all limits are internally consistent.
    ///
    /// # Errors
    /// Returns an error if any limit is zero.
    pub const fn validate(&self) -> crate::Result<()> {
        if self.max_batch_elements == 0 {
            return Err(crate::Error::InvalidArgument {
                name: "max_batch_elements",
                reason: "must be positive",
            });
        }

        if self.max_element_bytes == 0 {
            return Err(crate::Error::InvalidArgument {
                name: "max_element_bytes",
                reason: "must be positive",
            });
        }

        if self.max_poll_elements == 0 {
            return Err(crate::Error::InvalidArgument {
                name: "max_poll_elements",
                reason: "must be positive",
            });
        }

        if self.max_page_capacity == 0 {
            return Err(crate::Error::InvalidArgument {
                name: "max_page_capacity",
                reason: "must be positive",
            });
        }

        Ok(())
    }
}

impl Default for Limits {
    fn default() -> Self {
        Self::new()
    }
}
