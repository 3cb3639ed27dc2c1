//! Status code tables
//!
//! Every enumerated register decodes through a plain table lookup. Codes the
//! table does not know become `Unknown(code)` and render as `"Unknown (N)"`;
//! decoding a status code never fails.

use std::borrow::Cow;
use std::fmt;

macro_rules! status_code {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident = $code:literal => $label:literal, )+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $( $(#[$vmeta])* $variant, )+
            /// Code not in the table
            Unknown(u16),
        }

        impl $name {
            /// Raw register code
            pub fn code(self) -> u16 {
                match self {
                    $( Self::$variant => $code, )+
                    Self::Unknown(code) => code,
                }
            }

            /// Human-readable label
            pub fn label(self) -> Cow<'static, str> {
                match self {
                    $( Self::$variant => Cow::Borrowed($label), )+
                    Self::Unknown(code) => Cow::Owned(format!("Unknown ({})", code)),
                }
            }

            /// Whether the code is in the table
            pub fn is_known(self) -> bool {
                !matches!(self, Self::Unknown(_))
            }
        }

        impl From<u16> for $name {
            fn from(code: u16) -> Self {
                match code {
                    $( $code => Self::$variant, )+
                    other => Self::Unknown(other),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.label())
            }
        }
    };
}

status_code! {
    /// OCPP charge point status (register 104)
    OcppStatus {
        Undefined = 0 => "Undefined",
        Available = 1 => "Available",
        Preparing = 2 => "Preparing",
        Charging = 3 => "Charging",
        SuspendedEvse = 4 => "Suspended (Charger)",
        SuspendedEv = 5 => "Suspended (Vehicle)",
        Finishing = 6 => "Finishing",
        Reserved = 7 => "Reserved",
        Unavailable = 8 => "Unavailable",
        Faulted = 9 => "Faulted",
    }
}

status_code! {
    /// IEC 61851-1 control pilot state (register 122)
    VehicleState {
        /// State A
        NotConnected = 1 => "Not Connected",
        /// State B
        Connected = 2 => "Connected",
        /// State C
        Charging = 3 => "Charging",
        /// State D
        VentilationRequired = 4 => "Ventilation Required",
        /// State E
        Error = 5 => "Error",
    }
}

status_code! {
    /// Charge point availability (register 124)
    ChargePointAvailability {
        Unavailable = 0 => "Unavailable",
        Available = 1 => "Available",
    }
}

status_code! {
    /// Main relay (register 140)
    RelayState {
        Off = 0 => "Off",
        On = 1 => "On",
    }
}

status_code! {
    /// HEMS communication watchdog (register 2011)
    HemsCommStatus {
        Ok = 0 => "OK",
        /// Device reports error 1073 while in this state
        Timeout = 1 => "Timeout",
    }
}

status_code! {
    /// Phase switching mode (register 2020), configured on the device only
    PhaseSwitchMode {
        SinglePhase = 0 => "1 phase",
        ThreePhase = 1 => "3 phases",
        Dynamic = 2 => "Dynamic",
        Fixed = 3 => "Fixed (at connection)",
    }
}

status_code! {
    /// Phases assigned to the current session (register 2023)
    AssignedPhases {
        None = 0 => "None",
        One = 1 => "One phase",
        Three = 2 => "Three phases",
    }
}

status_code! {
    /// Authorization state (register 2030)
    AuthorizationStatus {
        Autostart = 0 => "Autostart",
        Authorized = 1 => "Authorized",
        NotAuthorized = 2 => "Not authorized",
    }
}
