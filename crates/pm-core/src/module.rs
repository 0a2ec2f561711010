//! Vote owner identities.
//!
//! Three independent id spaces, each a plain enum with a dense `u8`
//! discriminant:
//!
//! - [`SleepModule`]: owners of a low-voltage sleep vote
//! - [`PowerModule`]: power domains voting on deep-sleep shutdown
//! - [`DeviceId`]: CPU-frequency voters and per-device sleep hooks
//!
//! Gates are [`ModuleSet`]s keyed by the tag, never by position tricks.

use core::marker::PhantomData;

use crate::error::PmError;

/// Common surface of the id enums.
pub trait ModuleId: Copy + Eq + 'static {
    /// Number of variants.
    const COUNT: usize;
    /// Every variant in discriminant order.
    const ALL: &'static [Self];

    /// Dense index, `< COUNT`.
    fn index(self) -> usize;

    /// Short lowercase name for logs and the console.
    fn name(self) -> &'static str;

    /// Look a variant up by its console name.
    fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|m| m.name() == name)
    }
}

macro_rules! module_ids {
    (
        $(#[$meta:meta])*
        pub enum $ty:ident {
            $( $(#[$vmeta:meta])* $variant:ident = $name:literal, )+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[cfg_attr(feature = "defmt", derive(defmt::Format))]
        #[repr(u8)]
        pub enum $ty {
            $( $(#[$vmeta])* $variant, )+
        }

        impl ModuleId for $ty {
            const ALL: &'static [Self] = &[$( $ty::$variant ),+];
            const COUNT: usize = Self::ALL.len();

            fn index(self) -> usize {
                self as usize
            }

            fn name(self) -> &'static str {
                match self {
                    $( $ty::$variant => $name, )+
                }
            }
        }

        impl TryFrom<u8> for $ty {
            type Error = PmError;

            fn try_from(raw: u8) -> Result<Self, PmError> {
                Self::ALL
                    .get(usize::from(raw))
                    .copied()
                    .ok_or(PmError::InvalidModule)
            }
        }
    };
}

module_ids! {
    /// Independent owners of a sleep vote.
    pub enum SleepModule {
        /// I2C1 controller
        I2c1 = "i2c1",
        /// SPI1 controller
        Spi1 = "spi1",
        /// UART1 (console)
        Uart1 = "uart1",
        /// PWM group 1
        Pwm1 = "pwm1",
        /// Timer group 1
        Timer1 = "timer1",
        /// SAR ADC
        Saradc = "saradc",
        /// Audio subsystem
        Audio = "audio",
        /// Video subsystem
        Video = "video",
        /// Bluetooth stack
        Bt = "bt",
        /// WiFi MAC
        WifiMac = "wifi_mac",
        /// WiFi PHY
        WifiPhy = "wifi_phy",
        /// Timer group 2
        Timer2 = "timer2",
        /// Generic application slot
        App = "app",
        /// OTP controller
        Otp = "otp",
        /// I2S channel 1
        I2s1 = "i2s1",
        /// I2S channel 2
        I2s2 = "i2s2",
        /// I2S channel 3
        I2s3 = "i2s3",
        /// JPEG encoder
        Jpeg = "jpeg",
        /// General-purpose DMA
        Dma = "dma",
        /// Log output path
        Log = "log",
        /// Watchdog
        Wdt = "wdt",
        /// Touch controller
        Touch = "touch",
        /// USB controller
        Usb = "usb",
        /// SDIO host
        Sdio = "sdio",
        /// QSPI flash controller
        Qspi = "qspi",
        /// LCD controller
        Lcd = "lcd",
        /// Rotation engine
        Rott = "rott",
        /// CAN controller
        Can = "can",
        /// I2C2 controller
        I2c2 = "i2c2",
        /// UART2
        Uart2 = "uart2",
        /// UART3
        Uart3 = "uart3",
        /// SPI2 controller
        Spi2 = "spi2",
        /// Application slot 1
        App1 = "app1",
        /// Application slot 2
        App2 = "app2",
        /// Application slot 3
        App3 = "app3",
    }
}

module_ids! {
    /// Power domains voting on deep-sleep shutdown.
    pub enum PowerModule {
        /// SRAM bank 1
        Mem1 = "mem1",
        /// SRAM bank 2
        Mem2 = "mem2",
        /// SRAM bank 3
        Mem3 = "mem3",
        /// Crypto engine
        Encp = "encp",
        /// Backup domain
        Bakp = "bakp",
        /// AHB peripherals
        Ahbp = "ahbp",
        /// Audio domain
        Audio = "audio",
        /// Video domain
        Video = "video",
        /// Bluetooth subsystem
        Bt = "bt",
        /// WiFi MAC
        WifiMac = "wifi_mac",
        /// WiFi PHY
        WifiPhy = "wifi_phy",
        /// Second CPU core
        Cpu1 = "cpu1",
        /// Third CPU core
        Cpu2 = "cpu2",
        /// PSRAM
        Psram = "psram",
        /// Application-owned domain
        App = "app",
        /// Touch domain
        Touch = "touch",
        /// USB PHY
        Usb = "usb",
        /// LCD domain
        Lcd = "lcd",
        /// JPEG codec domain
        Jpeg = "jpeg",
        /// Rotation engine domain
        Rott = "rott",
    }
}

module_ids! {
    /// Devices voting on CPU frequency and owning per-device sleep hooks.
    pub enum DeviceId {
        /// Baseline voter (system default)
        Default = "default",
        /// I2C1
        I2c1 = "i2c1",
        /// SPI1
        Spi1 = "spi1",
        /// UART1
        Uart1 = "uart1",
        /// PWM group 1
        Pwm1 = "pwm1",
        /// Timer group 1
        Timer1 = "timer1",
        /// SAR ADC
        Saradc = "saradc",
        /// Audio
        Audio = "audio",
        /// Video
        Video = "video",
        /// Bluetooth
        Bt = "bt",
        /// WiFi
        Wifi = "wifi",
        /// Timer group 2
        Timer2 = "timer2",
        /// Application
        App = "app",
        /// OTP
        Otp = "otp",
        /// I2S
        I2s1 = "i2s1",
        /// JPEG
        Jpeg = "jpeg",
        /// DMA
        Dma = "dma",
        /// Log output
        Log = "log",
        /// LCD
        Lcd = "lcd",
        /// PSRAM
        Psram = "psram",
        /// USB
        Usb = "usb",
        /// Touch
        Touch = "touch",
        /// Second CPU core
        Cpu1 = "cpu1",
    }
}

// ── ModuleSet ────────────────────────────────────────────────────────────────

/// Bit set over one id space. Every id space above fits in 64 bits.
pub struct ModuleSet<M> {
    bits: u64,
    _ids: PhantomData<M>,
}

// Manual impls: derive would demand `M: Clone` etc. on the phantom parameter.
impl<M> Clone for ModuleSet<M> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<M> Copy for ModuleSet<M> {}

impl<M> PartialEq for ModuleSet<M> {
    fn eq(&self, other: &Self) -> bool {
        self.bits == other.bits
    }
}

impl<M> Eq for ModuleSet<M> {}

impl<M> core::fmt::Debug for ModuleSet<M> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "ModuleSet({:#x})", self.bits)
    }
}

#[cfg(feature = "defmt")]
impl<M> defmt::Format for ModuleSet<M> {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "ModuleSet({=u64:#x})", self.bits);
    }
}

impl<M> ModuleSet<M> {
    /// The empty set.
    pub const fn empty() -> Self {
        Self {
            bits: 0,
            _ids: PhantomData,
        }
    }

    /// Raw bit pattern, bit `i` set for index `i`.
    pub const fn bits(self) -> u64 {
        self.bits
    }

    /// Number of members.
    pub const fn len(self) -> u32 {
        self.bits.count_ones()
    }

    /// `true` when no member is set.
    pub const fn is_empty(self) -> bool {
        self.bits == 0
    }

    /// `true` if every member of `other` is also in `self`.
    pub const fn is_superset(self, other: Self) -> bool {
        self.bits & other.bits == other.bits
    }

    /// Members of `self` not in `other`.
    #[must_use]
    pub const fn difference(self, other: Self) -> Self {
        Self {
            bits: self.bits & !other.bits,
            _ids: PhantomData,
        }
    }
}

impl<M: ModuleId> ModuleSet<M> {
    /// Every id of the space.
    pub fn all() -> Self {
        M::ALL.iter().copied().collect()
    }

    /// Every id except those listed.
    pub fn all_except(excluded: &[M]) -> Self {
        let mut set = Self::all();
        for &m in excluded {
            set.remove(m);
        }
        set
    }

    fn bit(m: M) -> u64 {
        u32::try_from(m.index())
            .ok()
            .and_then(|i| 1u64.checked_shl(i))
            .unwrap_or(0)
    }

    /// Add a member.
    pub fn insert(&mut self, m: M) {
        self.bits |= Self::bit(m);
    }

    /// Remove a member.
    pub fn remove(&mut self, m: M) {
        self.bits &= !Self::bit(m);
    }

    /// Membership test.
    pub fn contains(self, m: M) -> bool {
        self.bits & Self::bit(m) != 0
    }

    /// Copy with `m` added.
    #[must_use]
    pub fn with(mut self, m: M) -> Self {
        self.insert(m);
        self
    }

    /// Members in index order.
    pub fn iter(self) -> impl Iterator<Item = M> {
        M::ALL.iter().copied().filter(move |&m| self.contains(m))
    }
}

impl<M> Default for ModuleSet<M> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<M: ModuleId> FromIterator<M> for ModuleSet<M> {
    fn from_iter<I: IntoIterator<Item = M>>(iter: I) -> Self {
        let mut set = Self::empty();
        for m in iter {
            set.insert(m);
        }
        set
    }
}
