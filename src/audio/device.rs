//! Input device enumeration and selection.
//!
//! A device selector is either a numeric index into the host's input device
//! list or a case-insensitive fragment of the device name.  With no selector
//! the host's default input device is used.

use cpal::traits::{DeviceTrait, HostTrait};

use super::capture::CaptureError;

/// Index of the device matching `selector` in `names`.
///
/// A selector that parses as an integer is treated as an index and must be
/// in range; anything else matches the first name containing it, ignoring
/// case.
pub fn match_device<S: AsRef<str>>(names: &[S], selector: &str) -> Option<usize> {
    let selector = selector.trim();
    if let Ok(index) = selector.parse::<usize>() {
        return (index < names.len()).then_some(index);
    }

    let needle = selector.to_lowercase();
    names
        .iter()
        .position(|name| name.as_ref().to_lowercase().contains(&needle))
}

/// Names of all input devices on `host`, in enumeration order.
pub fn list_input_devices(host: &cpal::Host) -> Result<Vec<String>, CaptureError> {
    let names = host
        .input_devices()?
        .enumerate()
        .map(|(idx, device)| {
            device
                .name()
                .unwrap_or_else(|_| format!("Input Device {idx}"))
        })
        .collect();
    Ok(names)
}

/// Resolve `selector` to an input device on `host`.
///
/// # Errors
///
/// [`CaptureError::DeviceNotFound`] when the selector matches nothing (the
/// available devices are logged), [`CaptureError::NoDevice`] when no
/// selector is given and the host has no default input.
pub fn select_input_device(
    host: &cpal::Host,
    selector: Option<&str>,
) -> Result<cpal::Device, CaptureError> {
    let Some(selector) = selector.filter(|s| !s.trim().is_empty()) else {
        return host.default_input_device().ok_or(CaptureError::NoDevice);
    };

    let names = list_input_devices(host)?;
    match match_device(&names, selector) {
        Some(index) => host
            .input_devices()?
            .nth(index)
            .ok_or_else(|| CaptureError::DeviceNotFound(selector.to_string())),
        None => {
            log::error!("audio device '{selector}' not found");
            log_available(&names);
            Err(CaptureError::DeviceNotFound(selector.to_string()))
        }
    }
}

/// Log every input device with its index, as a hint for the selector.
pub fn log_available(names: &[String]) {
    log::info!("available input devices:");
    for (idx, name) in names.iter().enumerate() {
        log::info!("  [{idx}] {name}");
    }
}

#[cfg(test)]
mod tests {
    use super::match_device;

    const NAMES: &[&str] = &[
        "HDA Intel PCH: ALC257 Analog",
        "USB PnP Sound Device",
        "Monitor of Built-in Audio",
    ];

    #[test]
    fn numeric_selector_is_an_index() {
        assert_eq!(match_device(NAMES, "1"), Some(1));
        assert_eq!(match_device(NAMES, " 2 "), Some(2));
    }

    #[test]
    fn out_of_range_index_matches_nothing() {
        assert_eq!(match_device(NAMES, "3"), None);
    }

    #[test]
    fn name_fragment_is_case_insensitive() {
        assert_eq!(match_device(NAMES, "usb pnp"), Some(1));
        assert_eq!(match_device(NAMES, "MONITOR"), Some(2));
    }

    #[test]
    fn first_match_wins() {
        assert_eq!(match_device(NAMES, "a"), Some(0));
    }

    #[test]
    fn unknown_name_matches_nothing() {
        assert_eq!(match_device(NAMES, "webcam"), None);
    }
}
