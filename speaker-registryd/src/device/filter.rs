use crate::config::FilterConfig;
use super::descriptor::DeviceDescriptor;

/// Exact-match filter selecting the target vendor/model class.
#[derive(Debug, Clone)]
pub struct DeviceFilter {
    manufacturer: String,
    model_description: String,
}

impl DeviceFilter {
    pub fn new(config: &FilterConfig) -> Self {
        Self {
            manufacturer: config.manufacturer.clone(),
            model_description: config.model_description.clone(),
        }
    }

    /// True iff the descriptor exists, both vendor strings match exactly and
    /// the vendor extension names a control URL.
    pub fn matches(&self, descriptor: Option<&DeviceDescriptor>) -> bool {
        match descriptor {
            Some(d) => {
                d.manufacturer == self.manufacturer
                    && d.model_description == self.model_description
                    && d.has_vendor_extension()
            }
            None => false,
        }
    }
}
