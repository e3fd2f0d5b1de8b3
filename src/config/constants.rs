// src/config/constants.rs
//! System-wide configuration constants

/// Device and acquisition defaults
pub mod device {
    pub const DEFAULT_URI: &str = "ip:192.168.2.1";
    pub const DEFAULT_CHANNEL_COUNT: usize = 2;
    pub const DEFAULT_SAMPLE_RATE_HZ: f64 = 100_000.0;
    pub const MAX_SAMPLE_RATE_HZ: f64 = 100_000_000.0;
    pub const DEFAULT_OVERSAMPLING_RATIO: u32 = 1;
    pub const DEFAULT_KERNEL_BUFFERS: u32 = 1;

    /// Number of distinct codes of the 12-bit converter
    pub const ADC_CODE_SPAN: u64 = 4096;
}

/// Buffering and streaming defaults
pub mod streaming {
    /// Samples per channel requested from the device per fetch
    pub const DEFAULT_BLOCK_SIZE: usize = 0x400;
    pub const MAX_BLOCK_SIZE: usize = 1 << 24;

    /// Bounded wait of the streaming task for a refill
    pub const DEFAULT_WAIT_TIMEOUT_MS: u64 = 100;
    pub const DEFAULT_MAX_TIMEOUTS_PER_CALL: u32 = 1;

    pub const DEFAULT_NOTIFICATION_CAPACITY: usize = 64;

    /// Tag key marking the first sample of a freshly fetched block
    pub const BUFFER_START_TAG: &str = "buffer_start";

    /// Prefix of the refill thread name, followed by the device URI
    pub const REFILL_THREAD_PREFIX: &str = "ain-refill";
}

/// Simulator defaults
pub mod simulation {
    pub const DEFAULT_RAMP_CHANNEL_OFFSET: u32 = 1000;
    pub const DEFAULT_SEED: u64 = 0x5eed;
}

/// Configuration file discovery
pub mod paths {
    pub const CONFIG_FILE_NAME: &str = "analog_in.toml";
    pub const ENV_PREFIX: &str = "ANALOG_IN";
    pub const ENV_SEPARATOR: &str = "__";
}
