//! Device-family specific command forms and output parsers.

pub mod cisco;
pub(crate) mod prelude;

use prelude::*;

/// Pick the command set for a device family. Only Cisco CLIs are known; any
/// other family gets the IOS forms and a warning, and the parsers' tolerance
/// takes care of the rest.
pub fn commands_for(family: &DeviceFamily) -> cisco::Cisco {
    match family {
        DeviceFamily::CiscoIos | DeviceFamily::CiscoNxos => cisco::Cisco::new(family.clone()),
        DeviceFamily::Other(tag) => {
            warn!(
                "No command set for device type '{}', using Cisco IOS commands",
                tag
            );
            cisco::Cisco::new(DeviceFamily::CiscoIos)
        }
    }
}
