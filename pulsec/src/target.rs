use std::fmt;

#[allow(non_camel_case_types)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, clap::ValueEnum)]
#[clap(rename_all = "snake_case")]
pub enum Target {
    x86_64_darwin,
    x86_64_linux,
    aarch64_darwin,
    aarch64_linux,
    /// Leaves the module without a target triple.
    #[clap(skip)]
    None,
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match Option::<pulse::Target>::from(*self) {
            Some(target) => fmt::Display::fmt(&target, f),
            None => f.write_str("none"),
        }
    }
}

impl From<Target> for Option<pulse::Target> {
    fn from(value: Target) -> Self {
        match value {
            Target::x86_64_darwin => Some(pulse::Target::x86_64_darwin),
            Target::x86_64_linux => Some(pulse::Target::x86_64_linux),
            Target::aarch64_darwin => Some(pulse::Target::aarch64_darwin),
            Target::aarch64_linux => Some(pulse::Target::aarch64_linux),
            Target::None => None,
        }
    }
}

cfg_if::cfg_if! {
    if #[cfg(all(target_arch = "x86_64", target_os = "macos"))] {
        pub const DEFAULT_TARGET: Target = Target::x86_64_darwin;
    } else if #[cfg(all(target_arch = "x86_64", target_os = "linux"))] {
        pub const DEFAULT_TARGET: Target = Target::x86_64_linux;
    } else if #[cfg(all(target_arch = "aarch64", target_os = "macos"))] {
        pub const DEFAULT_TARGET: Target = Target::aarch64_darwin;
    } else if #[cfg(all(target_arch = "aarch64", target_os = "linux"))] {
        pub const DEFAULT_TARGET: Target = Target::aarch64_linux;
    } else {
        pub const DEFAULT_TARGET: Target = Target::None;
    }
}
