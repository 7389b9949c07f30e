//! Raw input sources
//!
//! A source hands the sampler one reading per tick for every connected device.
//! Readings are plain values so the trackers never touch the platform API.
//!
//! Button and axis order follows the standard gamepad layout, which is what the
//! rhythm controllers report their physical button numbers against.

use gilrs::{Axis, Button, Event, EventType, Gilrs};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, error, info, warn};

/// One reading of a connected device
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub index: usize,
    pub name: String,
    pub buttons: Vec<bool>,
    pub axes: Vec<f32>,
}

impl Device {
    /// Pressed state of a physical button; buttons the device doesn't report read as released.
    pub fn button(&self, physical: usize) -> bool {
        self.buttons.get(physical).copied().unwrap_or(false)
    }

    /// Value of an axis; missing axes read as centred.
    pub fn axis(&self, index: usize) -> f32 {
        self.axes.get(index).copied().unwrap_or(0.0)
    }

    pub fn any_pressed(&self) -> bool {
        self.buttons.iter().any(|pressed| *pressed)
    }
}

// Source errors
#[derive(Debug, thiserror::Error)]
pub enum InputSourceError {
    #[error("Failed to initialize input source: {0}")]
    InitializationError(String),
}

/// Platform capability that reports connected devices
///
/// Implementations must not block: the sampler calls `devices` once per tick.
pub trait InputSource {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Current readings of every connected device
    fn devices(&mut self) -> Vec<Device>;

    /// Reading of one device, `None` when it is absent
    fn device(&mut self, index: usize) -> Option<Device> {
        self.devices().into_iter().find(|device| device.index == index)
    }
}

// Standard layout button order (index = physical button number)
const STANDARD_BUTTONS: [Button; 17] = [
    Button::South,
    Button::East,
    Button::West,
    Button::North,
    Button::LeftTrigger,
    Button::RightTrigger,
    Button::LeftTrigger2,
    Button::RightTrigger2,
    Button::Select,
    Button::Start,
    Button::LeftThumb,
    Button::RightThumb,
    Button::DPadUp,
    Button::DPadDown,
    Button::DPadLeft,
    Button::DPadRight,
    Button::Mode,
];

// Standard layout axis order
const STANDARD_AXES: [Axis; 4] = [
    Axis::LeftStickX,
    Axis::LeftStickY,
    Axis::RightStickX,
    Axis::RightStickY,
];

/// gilrs-backed source
///
/// `Gilrs` is not `Send`, so this source has to be created on the thread that samples it.
pub struct GilrsSource {
    gilrs: Gilrs,
}

impl GilrsSource {
    pub fn open() -> Result<Self, InputSourceError> {
        info!("Initializing gilrs controller interface");
        let gilrs = match Gilrs::new() {
            Ok(g) => {
                info!("Successfully initialized gilrs");
                g
            }
            Err(e) => {
                error!("Failed to initialize gilrs: {}", e);
                return Err(InputSourceError::InitializationError(e.to_string()));
            }
        };

        let gamepads: Vec<_> = gilrs.gamepads().collect();
        if gamepads.is_empty() {
            warn!("No gamepad connected, waiting for devices");
        } else {
            info!("Found {} gamepads:", gamepads.len());
            for (id, gamepad) in &gamepads {
                info!(
                    "  [{}] Name: {}, UUID: {:?}",
                    usize::from(*id),
                    gamepad.name(),
                    gamepad.uuid()
                );
            }
        }

        Ok(Self { gilrs })
    }

    // Drain pending events so gilrs updates its cached gamepad state
    fn pump_events(&mut self) {
        while let Some(Event { id, event, .. }) = self.gilrs.next_event() {
            match event {
                EventType::Connected => {
                    info!(
                        "Controller connected: [{}] {}",
                        usize::from(id),
                        self.gilrs.gamepad(id).name()
                    );
                }
                EventType::Disconnected => {
                    warn!("Controller disconnected: [{}]", usize::from(id));
                }
                _ => {}
            }
        }
    }
}

impl InputSource for GilrsSource {
    fn name(&self) -> &str {
        "gilrs"
    }

    fn devices(&mut self) -> Vec<Device> {
        self.pump_events();

        self.gilrs
            .gamepads()
            .map(|(id, gamepad)| Device {
                index: usize::from(id),
                name: gamepad.name().to_string(),
                buttons: STANDARD_BUTTONS
                    .iter()
                    .map(|button| gamepad.is_pressed(*button))
                    .collect(),
                axes: STANDARD_AXES
                    .iter()
                    .map(|axis| gamepad.value(*axis))
                    .collect(),
            })
            .collect()
    }
}

/// Stand-in used when the platform capability is missing; sampling becomes a no-op.
#[derive(Debug, Default)]
pub struct UnavailableSource;

impl InputSource for UnavailableSource {
    fn name(&self) -> &str {
        "unavailable"
    }

    fn devices(&mut self) -> Vec<Device> {
        Vec::new()
    }
}

/// Resolves the platform capability once; a failure degrades to [`UnavailableSource`].
pub fn open_default_source() -> Box<dyn InputSource> {
    match GilrsSource::open() {
        Ok(source) => Box::new(source),
        Err(e) => {
            warn!("Input source unavailable, sampling disabled: {}", e);
            Box::new(UnavailableSource)
        }
    }
}

/// In-memory source fed by the caller
///
/// Used for replaying recorded input and in tests.
#[derive(Debug, Default, Clone)]
pub struct MemorySource {
    devices: BTreeMap<usize, Device>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_device(&mut self, device: Device) {
        debug!("Memory source updated device {}", device.index);
        self.devices.insert(device.index, device);
    }

    pub fn remove_device(&mut self, index: usize) -> Option<Device> {
        self.devices.remove(&index)
    }
}

impl InputSource for MemorySource {
    fn name(&self) -> &str {
        "memory"
    }

    fn devices(&mut self) -> Vec<Device> {
        self.devices.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_buttons_and_axes_read_as_idle() {
        let device = Device {
            index: 0,
            name: "pad".into(),
            buttons: vec![true, false],
            axes: vec![0.5],
        };

        assert!(device.button(0));
        assert!(!device.button(1));
        assert!(!device.button(9));
        assert_eq!(device.axis(0), 0.5);
        assert_eq!(device.axis(1), 0.0);
        assert!(device.any_pressed());
    }

    #[test]
    fn memory_source_reports_devices_in_index_order() {
        let mut source = MemorySource::new();
        source.set_device(Device {
            index: 3,
            ..Default::default()
        });
        source.set_device(Device {
            index: 1,
            ..Default::default()
        });

        let indices: Vec<usize> = source.devices().iter().map(|d| d.index).collect();
        assert_eq!(indices, vec![1, 3]);

        assert_eq!(source.device(3).map(|d| d.index), Some(3));
        assert!(source.device(2).is_none());

        source.remove_device(1);
        assert_eq!(source.devices().len(), 1);
    }

    #[test]
    fn unavailable_source_reports_nothing() {
        let mut source = UnavailableSource;
        assert!(source.devices().is_empty());
    }
}
