use std::fmt;

use rdssh_domain::{PerformancePreset, RdpOptions};
use zeroize::Zeroizing;

use crate::automation::OptionValue;

// TS_PERF_* bits of the PerformanceFlags advanced setting.
pub const PERF_DISABLE_WALLPAPER: i32 = 0x0000_0001;
pub const PERF_DISABLE_FULLWINDOWDRAG: i32 = 0x0000_0002;
pub const PERF_DISABLE_MENUANIMATIONS: i32 = 0x0000_0004;
pub const PERF_DISABLE_THEMING: i32 = 0x0000_0008;
pub const PERF_DISABLE_CURSOR_SHADOW: i32 = 0x0000_0020;
pub const PERF_DISABLE_CURSORSETTINGS: i32 = 0x0000_0040;
pub const PERF_ENABLE_FONT_SMOOTHING: i32 = 0x0000_0080;
pub const PERF_ENABLE_DESKTOP_COMPOSITION: i32 = 0x0000_0100;

/// Everything a controller needs for one connect attempt.
pub struct ConnectParams {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub domain: Option<String>,
    pub password: Option<Zeroizing<String>>,
    pub desktop_width: i32,
    pub desktop_height: i32,
    pub options: RdpOptions,
    /// Forces the interactive credential prompt on or off.
    pub prompt_override: Option<bool>,
}

impl ConnectParams {
    pub fn has_password(&self) -> bool {
        self.password.as_ref().is_some_and(|p| !p.is_empty())
    }

    /// Prompt iff no password was supplied, unless overridden.
    pub fn prompt_for_credentials(&self) -> bool {
        self.prompt_override.unwrap_or(!self.has_password())
    }
}

impl fmt::Debug for ConnectParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectParams")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("domain", &self.domain)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("desktop_width", &self.desktop_width)
            .field("desktop_height", &self.desktop_height)
            .field("options", &self.options)
            .field("prompt_override", &self.prompt_override)
            .finish()
    }
}

/// One advanced or secured property, with an optional older spelling tried
/// when the first is not applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingEntry {
    pub name: String,
    pub fallback: Option<&'static str>,
    pub value: OptionValue,
}

impl SettingEntry {
    fn new(name: impl Into<String>, value: OptionValue) -> Self {
        Self {
            name: name.into(),
            fallback: None,
            value,
        }
    }

    fn with_fallback(mut self, fallback: &'static str) -> Self {
        self.fallback = Some(fallback);
        self
    }
}

pub fn performance_flags(options: &RdpOptions) -> i32 {
    let preset = match options.performance_preset {
        PerformancePreset::Auto => 0,
        PerformancePreset::Low => {
            PERF_DISABLE_WALLPAPER
                | PERF_DISABLE_FULLWINDOWDRAG
                | PERF_DISABLE_MENUANIMATIONS
                | PERF_DISABLE_THEMING
                | PERF_DISABLE_CURSOR_SHADOW
                | PERF_DISABLE_CURSORSETTINGS
        }
        PerformancePreset::Medium => {
            PERF_DISABLE_WALLPAPER | PERF_DISABLE_FULLWINDOWDRAG | PERF_DISABLE_CURSOR_SHADOW
        }
        PerformancePreset::High => PERF_ENABLE_DESKTOP_COMPOSITION,
    };

    let mut flags = preset;
    if options.font_smoothing {
        flags |= PERF_ENABLE_FONT_SMOOTHING;
    }
    if options.disable_animations {
        flags |= PERF_DISABLE_MENUANIMATIONS;
    }
    flags
}

/// Advanced-settings properties for a profile, in application order.
pub fn advanced_settings(port: u16, options: &RdpOptions) -> Vec<SettingEntry> {
    let mut entries = vec![
        SettingEntry::new("RDPPort", OptionValue::Int(i32::from(port))),
        SettingEntry::new("RedirectClipboard", OptionValue::Bool(options.clipboard)),
        SettingEntry::new("EnableCredSspSupport", OptionValue::Bool(!options.tls_legacy)),
        SettingEntry::new(
            "AuthenticationLevel",
            OptionValue::Int(if options.ignore_cert { 0 } else { 2 }),
        ),
    ];

    if options.admin_mode {
        entries.push(
            SettingEntry::new("ConnectToAdministerServer", OptionValue::Bool(true))
                .with_fallback("ConnectToServerConsole"),
        );
    }

    if let Some(info) = options
        .load_balance_info
        .as_deref()
        .map(str::trim)
        .filter(|info| !info.is_empty())
    {
        entries.push(SettingEntry::new(
            "LoadBalanceInfo",
            OptionValue::Str(info.to_string()),
        ));
    }

    // The control's own spelling.
    entries.push(SettingEntry::new(
        "BitmapPeristence",
        OptionValue::Int(i32::from(options.bitmap_cache)),
    ));
    entries.push(SettingEntry::new(
        "PerformanceFlags",
        OptionValue::Int(performance_flags(options)),
    ));

    entries.extend(extra_settings(options.extra_args.as_deref().unwrap_or_default()));
    entries
}

/// Secured-settings properties applied to every session.
pub fn secured_settings() -> Vec<SettingEntry> {
    // 1 = send Windows key combinations to the remote session while focused.
    vec![SettingEntry::new("KeyboardHookMode", OptionValue::Int(1))]
}

/// Top-level `ColorDepth` for the preset.
pub fn color_depth(options: &RdpOptions) -> i32 {
    match options.performance_preset {
        PerformancePreset::Low => 16,
        _ => 32,
    }
}

/// Parses whitespace-separated `name=value` tokens.
pub fn extra_settings(raw: &str) -> Vec<SettingEntry> {
    raw.split_whitespace()
        .filter_map(|token| match token.split_once('=') {
            Some((name, value)) if !name.is_empty() && !value.is_empty() => {
                Some(SettingEntry::new(name, OptionValue::parse(value)))
            }
            _ => {
                tracing::warn!(token, "ignoring malformed extra rdp argument");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value_of<'a>(entries: &'a [SettingEntry], name: &str) -> Option<&'a OptionValue> {
        entries.iter().find(|e| e.name == name).map(|e| &e.value)
    }

    #[test]
    fn prompt_rule_follows_password_unless_overridden() {
        let mut params = ConnectParams {
            host: "srv1".into(),
            port: 3389,
            username: "alice".into(),
            domain: None,
            password: Some(Zeroizing::new("pw".into())),
            desktop_width: 1280,
            desktop_height: 720,
            options: RdpOptions::default(),
            prompt_override: None,
        };
        assert!(!params.prompt_for_credentials());
        assert!(!format!("{params:?}").contains("pw"));

        params.password = Some(Zeroizing::new(String::new()));
        assert!(params.prompt_for_credentials());

        params.password = None;
        params.prompt_override = Some(false);
        assert!(!params.prompt_for_credentials());
    }

    #[test]
    fn maps_default_options() {
        let entries = advanced_settings(3390, &RdpOptions::default());
        assert_eq!(value_of(&entries, "RDPPort"), Some(&OptionValue::Int(3390)));
        assert_eq!(value_of(&entries, "RedirectClipboard"), Some(&OptionValue::Bool(true)));
        assert_eq!(value_of(&entries, "EnableCredSspSupport"), Some(&OptionValue::Bool(true)));
        assert_eq!(value_of(&entries, "AuthenticationLevel"), Some(&OptionValue::Int(2)));
        assert_eq!(value_of(&entries, "BitmapPeristence"), Some(&OptionValue::Int(1)));
        assert_eq!(
            value_of(&entries, "PerformanceFlags"),
            Some(&OptionValue::Int(PERF_ENABLE_FONT_SMOOTHING))
        );
        assert!(value_of(&entries, "ConnectToAdministerServer").is_none());
        assert!(value_of(&entries, "LoadBalanceInfo").is_none());
    }

    #[test]
    fn maps_admin_mode_routing_and_extras() {
        let options = RdpOptions {
            ignore_cert: true,
            tls_legacy: true,
            admin_mode: true,
            load_balance_info: Some(" tsv://MS Terminal Services Plugin.1.Pool ".into()),
            extra_args: Some("SmartSizing=true Compress=1 bogus KeepAliveInterval=".into()),
            performance_preset: PerformancePreset::Low,
            disable_animations: true,
            font_smoothing: false,
            ..RdpOptions::default()
        };
        let entries = advanced_settings(3389, &options);

        assert_eq!(value_of(&entries, "AuthenticationLevel"), Some(&OptionValue::Int(0)));
        assert_eq!(value_of(&entries, "EnableCredSspSupport"), Some(&OptionValue::Bool(false)));
        let admin = entries
            .iter()
            .find(|e| e.name == "ConnectToAdministerServer")
            .expect("admin entry");
        assert_eq!(admin.fallback, Some("ConnectToServerConsole"));
        assert_eq!(
            value_of(&entries, "LoadBalanceInfo"),
            Some(&OptionValue::Str("tsv://MS Terminal Services Plugin.1.Pool".into()))
        );
        assert_eq!(value_of(&entries, "SmartSizing"), Some(&OptionValue::Bool(true)));
        assert_eq!(value_of(&entries, "Compress"), Some(&OptionValue::Int(1)));
        assert!(value_of(&entries, "bogus").is_none());
        assert!(value_of(&entries, "KeepAliveInterval").is_none());
        assert_eq!(performance_flags(&options), 0x6F);
        assert_eq!(color_depth(&options), 16);
    }
}
