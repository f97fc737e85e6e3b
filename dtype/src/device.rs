use std::fmt;

/// Where a buffer lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum DeviceSpec {
    #[default]
    Cpu,
    Cuda {
        device_id: usize,
    },
    Metal {
        device_id: usize,
    },
}

impl DeviceSpec {
    /// Canonical device string, e.g. `CPU` or `CUDA:1`.
    pub fn canonicalize(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for DeviceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cpu => f.write_str("CPU"),
            Self::Cuda { device_id } => write!(f, "CUDA:{device_id}"),
            Self::Metal { device_id } => write!(f, "METAL:{device_id}"),
        }
    }
}

impl std::str::FromStr for DeviceSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.to_ascii_uppercase();
        let (name, id) = match upper.split_once(':') {
            Some((name, id)) => (name.to_string(), id.parse::<usize>().map_err(|e| format!("{s}: {e}"))?),
            None => (upper.clone(), 0),
        };
        match name.as_str() {
            "CPU" | "CLANG" => Ok(Self::Cpu),
            "CUDA" | "GPU" => Ok(Self::Cuda { device_id: id }),
            "METAL" => Ok(Self::Metal { device_id: id }),
            _ => Err(format!("unknown device: {s}")),
        }
    }
}
