use crate::msg::PARAM_UNDEFINED;

/// Periodic liveness signal carrying an optional load figure.
///
/// A heartbeat constructed with [`HeartBeat::default`] reports
/// [`PARAM_UNDEFINED`] rather than zero, keeping "no data" distinct from
/// "zero load".
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeartBeat {
    /// Reported system load, or [`PARAM_UNDEFINED`].
    pub load: i32,
}

impl HeartBeat {
    pub fn new(load: i32) -> Self {
        Self { load }
    }
}

impl Default for HeartBeat {
    fn default() -> Self {
        Self {
            load: PARAM_UNDEFINED,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_load_is_the_undefined_sentinel() {
        let heartbeat = HeartBeat::default();
        assert_eq!(heartbeat.load, PARAM_UNDEFINED);
        assert_ne!(heartbeat.load, 0);
    }

    #[test]
    fn explicit_load_is_kept() {
        assert_eq!(HeartBeat::new(0).load, 0);
        assert_eq!(HeartBeat::new(17).load, 17);
    }
}
