//! Interrupt, status, command and IO status words.

use bitflags::bitflags;

use crate::INTERRUPT_SOURCES;

bitflags! {
    /// Interrupt sources, one bit per source number.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct InterruptMask: u32 {
        const COUNTER_0     = 0x0001;
        const COUNTER_1     = 0x0002;
        const COUNTER_2     = 0x0004;
        const COUNTER_3     = 0x0008;
        const COUNTER_4     = 0x0010;
        const COUNTER_5     = 0x0020;
        const COUNTER_6     = 0x0040;
        const COUNTER_7     = 0x0080;
        const COUNTER_8     = 0x0100;
        const PLL_ITERATION = 0x0200;
        const GMT_EVENT_IN  = 0x0400;
        const PPS           = 0x0800;
        const ONE_KHZ       = 0x1000;
        const MATCHED       = 0x2000;
    }
}

impl InterruptMask {
    /// Mask for a single source number, empty when out of range.
    pub const fn source(n: usize) -> Self {
        if n < INTERRUPT_SOURCES {
            Self::from_bits_truncate(1 << n)
        } else {
            Self::empty()
        }
    }

    /// Set source numbers in ascending order.
    pub fn sources(self) -> impl Iterator<Item = usize> {
        (0..INTERRUPT_SOURCES).filter(move |n| self.bits() & (1 << n) != 0)
    }
}

bitflags! {
    /// Module status. The low ten bits come from hardware, the rest are
    /// maintained by the driver.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Status: u32 {
        /// No GMT errors
        const GMT_OK             = 0x001;
        /// PLL locked on GMT
        const PLL_OK             = 0x002;
        const EXT_CLK_1_OK       = 0x004;
        const EXT_CLK_2_OK       = 0x008;
        const SELF_TEST_OK       = 0x010;
        /// Event reception enabled
        const ENABLED            = 0x020;
        /// HPTDC chip installed
        const HPTDC_IN           = 0x040;
        const CTRI               = 0x080;
        const CTRP               = 0x100;
        const CTRV               = 0x200;
        /// Software: interrupts are serviced fast enough
        const NO_LOST_INTERRUPTS = 0x400;
        /// Software: no recent bus error
        const NO_BUS_ERROR       = 0x800;
    }
}

impl Status {
    /// Bits the hardware reports.
    pub const HW_MASK: u32 = 0x3FF;
    /// Module type bits.
    pub const TYPE_MASK: Status = Status::CTRI.union(Status::CTRP).union(Status::CTRV);

    /// Hardware type encoded in the type bits, all three set means unknown.
    pub fn hardware_type(self) -> HardwareType {
        let bits = self.intersection(Self::TYPE_MASK);
        if bits == Self::TYPE_MASK {
            HardwareType::None
        } else if bits.contains(Status::CTRV) {
            HardwareType::Ctrv
        } else if bits.contains(Status::CTRP) {
            HardwareType::Ctrp
        } else if bits.contains(Status::CTRI) {
            HardwareType::Ctri
        } else {
            HardwareType::None
        }
    }
}

field_enum! {
    pub enum HardwareType("hardware type") {
        None = 0,
        Ctrp = 1,
        Ctri = 2,
        Ctrv = 3,
    }
}

bitflags! {
    /// Command register bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Command: u32 {
        const RESET          = 0x001;
        /// Enable timing input
        const ENABLE         = 0x002;
        /// Disable timing input
        const DISABLE        = 0x004;
        /// Latch UTC prior to reading it
        const LATCH_UTC      = 0x008;
        /// Load the set-time register when no timing is connected
        const SET_UTC        = 0x010;
        const SET_HPTDC      = 0x020;
        const DISABLE_HPTDC  = 0x040;
        const DEBUG_HIS_ON   = 0x080;
        const DEBUG_HIS_OFF  = 0x100;
        const UTC_PLL_OFF    = 0x200;
        const UTC_PLL_ON     = 0x400;
    }
}

bitflags! {
    /// Module inputs, outputs and options.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct IoStatus: u32 {
        const CTRXE             = 0x0_0001;
        const CTRXI             = 0x0_0002;
        const V1_PCB            = 0x0_0004;
        const V2_PCB            = 0x0_0008;
        const S1                = 0x0_0010;
        const S2                = 0x0_0020;
        const X1                = 0x0_0040;
        const X2                = 0x0_0080;
        const O1                = 0x0_0100;
        const O2                = 0x0_0200;
        const O3                = 0x0_0400;
        const O4                = 0x0_0800;
        const O5                = 0x0_1000;
        const O6                = 0x0_2000;
        const O7                = 0x0_4000;
        const O8                = 0x0_8000;
        const ID_OK             = 0x1_0000;
        const DEBUG_HISTORY     = 0x2_0000;
        const UTC_PLL_ENABLED   = 0x4_0000;
        const EXTENDED_MEMORY   = 0x8_0000;
        const TEMPERATURE_OK    = 0x10_0000;
    }
}
