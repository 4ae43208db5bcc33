use crate::error::{Error, Result};
use crate::lcp::LinkControl;
use hdlc::CodecConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Largest payload accepted, advertised to the peer as our MRU.
    pub mtu_max: usize,
    pub rx_slots: usize,
    /// Size of the LCP option buffers.
    pub lcp_buffer_size: usize,
    /// Segments left in the pool for the network layer.
    pub spare_segments: usize,
    /// Bound of the byte channel between the transport and the link.
    pub event_queue_depth: usize,
    pub baud_rate: u32,
    pub port: Option<String>,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            mtu_max: 1500,
            rx_slots: 2,
            lcp_buffer_size: 64,
            spare_segments: 8,
            event_queue_depth: 1024,
            baud_rate: 19200,
            port: None,
        }
    }
}

impl LinkConfig {
    /// Largest `mtu_max` that still leaves room for the FCS in a slot length.
    pub const MAX_MTU: usize = u16::MAX as usize - 2;

    /// Load configuration from an optional TOML file, overridden by `PPP_*`
    /// environment variables.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path));
        }

        let settings = builder
            .add_source(config::Environment::with_prefix("PPP").try_parsing(true))
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(toml: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(1..=Self::MAX_MTU).contains(&self.mtu_max) {
            return Err(Error::InvalidConfig(format!(
                "mtu_max must be within 1..={}, got {}",
                Self::MAX_MTU,
                self.mtu_max
            )));
        }
        if self.rx_slots == 0 {
            return Err(Error::InvalidConfig("rx_slots must be at least 1".to_string()));
        }
        if self.lcp_buffer_size < 16 {
            return Err(Error::InvalidConfig(format!(
                "lcp_buffer_size must be at least 16, got {}",
                self.lcp_buffer_size
            )));
        }
        if self.event_queue_depth == 0 {
            return Err(Error::InvalidConfig(
                "event_queue_depth must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// MRU advertised in our Configure-Request.
    pub fn mru(&self) -> u16 {
        u16::try_from(self.mtu_max).unwrap_or(u16::MAX)
    }

    pub fn codec_config(&self) -> CodecConfig {
        CodecConfig {
            mtu_max: self.mtu_max,
            rx_slots: self.rx_slots,
            segment_capacity: self.rx_slots + LinkControl::SEGMENTS + self.spare_segments,
        }
    }
}
