use sha2::{Digest, Sha256};
use shared::types::{Device, DeviceEntry};

/// Length-prefixed so adjacent fields cannot run into each other.
fn hash_field(hasher: &mut Sha256, value: &[u8]) {
    hasher.update((value.len() as u64).to_le_bytes());
    hasher.update(value);
}

fn hash_optional<T: ToString>(hasher: &mut Sha256, value: Option<T>) {
    match value {
        Some(v) => {
            hasher.update([1u8]);
            hash_field(hasher, v.to_string().as_bytes());
        }
        None => hasher.update([0u8]),
    }
}

fn hash_device(hasher: &mut Sha256, device: &Device) {
    for field in [
        device.id.as_str(),
        device.power.as_str(),
        device.base_url.as_str(),
        device.control_url.as_str(),
        device.friendly_name.as_str(),
        device.device_type.as_str(),
        device.input.as_str(),
        device.input_text.as_str(),
    ] {
        hash_field(hasher, field.as_bytes());
    }
    hash_optional(hasher, device.volume);
    hash_optional(hasher, Some(device.max_volume));
    hash_optional(hasher, device.mute);
}

/// SHA-256 over the device set, hex encoded.
/// Entries are visited in identity order; timestamps are not part of the hash.
pub fn compute_hash(entries: &[DeviceEntry]) -> String {
    let mut indices: Vec<usize> = (0..entries.len()).collect();
    indices.sort_by(|&a, &b| entries[a].device.id.cmp(&entries[b].device.id));

    let mut hasher = Sha256::new();
    for i in indices {
        hash_device(&mut hasher, &entries[i].device);
    }
    hex::encode(hasher.finalize())
}
