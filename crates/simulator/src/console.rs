//! `pm` console commands.
//!
//! One line in, one reply out. The command table mirrors what a board's
//! shell exposes for poking at the PM core by hand:
//!
//! ```text
//! pm vote <module> <0|1> [sleep_time]   sleep vote
//! pm power <domain> <on|off>            power-domain vote
//! pm freq <device> <mhz>                CPU floor
//! pm mode <normal|lv|deep|super>        requested sleep mode
//! pm wake rtc <ms> | gpio <pin> | <src> arm a wakeup source
//! pm irq gpio [console] | rtc <module> <repeat> | <src>
//!                                       inject a wake interrupt
//! pm lpo <rosc|xtal32k|26m>             switch the 32 kHz source
//! pm status | pm stats                  state and queue counters
//! ```

use core::fmt::Write as _;

use embassy_time::Duration;
use platform::PmHal;
use pm_core::{
    CpuFrequency, DeviceId, GpioTrigger, GpioWake, LpoSource, ModuleId, PmError, PmMessage,
    PowerManager, PowerModule, PowerState, SleepMode, SleepModule, WakeupParam, WakeupSource,
};

/// Help text printed by `help` and on usage errors.
pub const USAGE: &str = "\
pm vote <module> <0|1> [sleep_time]
pm power <domain> <on|off>
pm freq <device> <mhz>
pm mode <normal|lv|deep|super>
pm wake rtc <ms> | gpio <pin> | wifi|bt|usb|touch
pm irq gpio [console] | rtc <module> <repeat> | wifi|bt|usb|touch
pm lpo <rosc|xtal32k|26m>
pm status
pm stats";

/// Why a console line was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleError {
    /// Wrong shape; carries the expected form.
    Usage(&'static str),
    /// First word is not a known command.
    UnknownCommand(String),
    /// Name not found in the relevant id space.
    UnknownName(String),
    /// Argument is not a number.
    BadNumber(String),
    /// The PM core refused the request.
    Pm(PmError),
}

impl core::fmt::Display for ConsoleError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Usage(form) => write!(f, "usage: {form}"),
            Self::UnknownCommand(cmd) => write!(f, "unknown command '{cmd}', try 'help'"),
            Self::UnknownName(name) => write!(f, "unknown name '{name}'"),
            Self::BadNumber(arg) => write!(f, "'{arg}' is not a number"),
            Self::Pm(e) => write!(f, "pm: {e}"),
        }
    }
}

impl std::error::Error for ConsoleError {}

impl From<PmError> for ConsoleError {
    fn from(e: PmError) -> Self {
        Self::Pm(e)
    }
}

type Reply = Result<String, ConsoleError>;

/// Run one console line against `pm`.
pub fn execute<H: PmHal>(pm: &PowerManager<H>, line: &str) -> Reply {
    let words: Vec<&str> = line.split_whitespace().collect();
    match words.as_slice() {
        [] => Ok(String::new()),
        ["help"] | ["pm"] | ["pm", "help"] => Ok(USAGE.to_owned()),
        ["pm", "vote", rest @ ..] => vote(pm, rest),
        ["pm", "power", rest @ ..] => power(pm, rest),
        ["pm", "freq", rest @ ..] => freq(pm, rest),
        ["pm", "mode", rest @ ..] => mode(pm, rest),
        ["pm", "wake", rest @ ..] => wake(pm, rest),
        ["pm", "irq", rest @ ..] => irq(pm, rest),
        ["pm", "lpo", rest @ ..] => lpo(pm, rest),
        ["pm", "status"] => Ok(status(pm)),
        ["pm", "stats"] => Ok(stats(pm)),
        [cmd, ..] => Err(ConsoleError::UnknownCommand((*cmd).to_owned())),
    }
}

fn lookup<M: ModuleId>(name: &str) -> Result<M, ConsoleError> {
    M::from_name(name).ok_or_else(|| ConsoleError::UnknownName(name.to_owned()))
}

fn number<T: core::str::FromStr>(arg: &str) -> Result<T, ConsoleError> {
    arg.parse().map_err(|_| ConsoleError::BadNumber(arg.to_owned()))
}

fn vote<H: PmHal>(pm: &PowerManager<H>, args: &[&str]) -> Reply {
    const FORM: &str = "pm vote <module> <0|1> [sleep_time]";
    let (module, asleep, sleep_time) = match args {
        [module, asleep] => (*module, *asleep, "0"),
        [module, asleep, time] => (*module, *asleep, *time),
        _ => return Err(ConsoleError::Usage(FORM)),
    };
    let module: SleepModule = lookup(module)?;
    let asleep = match asleep {
        "0" => false,
        "1" => true,
        _ => return Err(ConsoleError::Usage(FORM)),
    };
    pm.vote_sleep(module, asleep, number(sleep_time)?)?;
    Ok(format!(
        "{} {}; low voltage {}",
        module.name(),
        if asleep { "asleep" } else { "active" },
        if pm.low_voltage_eligible() { "allowed" } else { "blocked" }
    ))
}

fn power<H: PmHal>(pm: &PowerManager<H>, args: &[&str]) -> Reply {
    const FORM: &str = "pm power <domain> <on|off>";
    let [domain, state] = args else {
        return Err(ConsoleError::Usage(FORM));
    };
    let domain: PowerModule = lookup(domain)?;
    let state = match *state {
        "on" => PowerState::On,
        "off" => PowerState::Off,
        _ => return Err(ConsoleError::Usage(FORM)),
    };
    pm.vote_power(domain, state)?;
    Ok(format!(
        "{} {}; deep sleep {}",
        domain.name(),
        state.name(),
        if pm.deep_sleep_eligible() { "allowed" } else { "blocked" }
    ))
}

fn freq<H: PmHal>(pm: &PowerManager<H>, args: &[&str]) -> Reply {
    let [device, mhz] = args else {
        return Err(ConsoleError::Usage("pm freq <device> <mhz>"));
    };
    let device: DeviceId = lookup(device)?;
    let mhz: u32 = number(mhz)?;
    let floor = CpuFrequency::from_mhz(mhz).ok_or(ConsoleError::Pm(PmError::InvalidParam))?;
    pm.vote_cpu_freq(device, floor)?;
    Ok(format!("cpu {} MHz", pm.current_max_cpu_freq().mhz()))
}

fn mode<H: PmHal>(pm: &PowerManager<H>, args: &[&str]) -> Reply {
    let mode = match args {
        ["normal"] => SleepMode::Normal,
        ["lv"] => SleepMode::LowVoltage,
        ["deep"] => SleepMode::DeepSleep,
        ["super"] => SleepMode::SuperDeepSleep,
        _ => return Err(ConsoleError::Usage("pm mode <normal|lv|deep|super>")),
    };
    pm.set_sleep_mode(mode);
    Ok(format!("mode {}", mode.name()))
}

fn plain_source(name: &str) -> Option<WakeupSource> {
    match name {
        "wifi" => Some(WakeupSource::Wifi),
        "bt" => Some(WakeupSource::Bt),
        "usb" => Some(WakeupSource::Usb),
        "touch" => Some(WakeupSource::Touch),
        _ => None,
    }
}

fn wake<H: PmHal>(pm: &PowerManager<H>, args: &[&str]) -> Reply {
    const FORM: &str = "pm wake rtc <ms> | gpio <pin> | wifi|bt|usb|touch";
    let (source, param) = match args {
        ["rtc", ms] => (
            WakeupSource::Rtc,
            WakeupParam::Rtc {
                period: Duration::from_millis(number(ms)?),
            },
        ),
        ["gpio", pin] => (
            WakeupSource::Gpio,
            WakeupParam::Gpio(GpioWake {
                pin: number(pin)?,
                trigger: GpioTrigger::FallingEdge,
            }),
        ),
        [name] => (
            plain_source(name).ok_or(ConsoleError::Usage(FORM))?,
            WakeupParam::Plain,
        ),
        _ => return Err(ConsoleError::Usage(FORM)),
    };
    pm.wakeup_source_set(source, param)?;
    Ok(format!("{} wake armed", source.name()))
}

fn irq<H: PmHal>(pm: &PowerManager<H>, args: &[&str]) -> Reply {
    const FORM: &str = "pm irq gpio [console] | rtc <module> <repeat> | wifi|bt|usb|touch";
    // Interrupts are taken as if they ended a low-voltage sleep.
    let from = SleepMode::LowVoltage;
    let msg = match args {
        ["gpio"] => PmMessage::gpio(from, false),
        ["gpio", "console"] => PmMessage::gpio(from, true),
        ["rtc", module, repeat] => PmMessage::rtc_edge(from, lookup(module)?, number(repeat)?),
        [name] => PmMessage::wakeup(from, plain_source(name).ok_or(ConsoleError::Usage(FORM))?),
        _ => return Err(ConsoleError::Usage(FORM)),
    };
    pm.send_msg(msg)?;
    Ok("queued".to_owned())
}

fn lpo<H: PmHal>(pm: &PowerManager<H>, args: &[&str]) -> Reply {
    let target = match args {
        ["rosc"] => LpoSource::Rosc,
        ["xtal32k"] => LpoSource::Xtal32k,
        ["26m"] => LpoSource::Derived26m,
        _ => return Err(ConsoleError::Usage("pm lpo <rosc|xtal32k|26m>")),
    };
    pm.switch_lpo_source(target)?;
    Ok(format!("lpo {}", target.name()))
}

fn status<H: PmHal>(pm: &PowerManager<H>) -> String {
    let s = pm.status();
    let mut out = String::new();
    let _ = writeln!(out, "state      {}", s.state.name());
    let _ = writeln!(out, "requested  {}", s.requested.name());
    let _ = writeln!(out, "cpu        {} MHz", s.cpu_freq.mhz());
    let _ = writeln!(out, "lpo        {}", s.lpo.name());
    let _ = writeln!(out, "last wake  {}", s.wakeup_reason.name());
    let deep = if s.deep_sleep_eligible { "allowed" } else { "blocked" };
    let _ = writeln!(out, "deep sleep {deep}");
    let _ = write!(out, "lv blocked by");
    if s.lv_blockers.is_empty() {
        let _ = write!(out, " nothing");
    }
    for m in s.lv_blockers.iter() {
        let _ = write!(out, " {}", m.name());
    }
    out
}

fn stats<H: PmHal>(pm: &PowerManager<H>) -> String {
    let q = pm.stats();
    let s = pm.status();
    format!(
        "sent {} dropped {} reports {} pending {}\nheartbeats {} rtc edges {}",
        q.success,
        q.fail,
        q.drop_reports,
        pm.pending(),
        s.heartbeats,
        s.rtc_edges
    )
}
