//! Well-known IMAP server presets.

use serde::Serialize;

/// An IMAP server preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Provider {
    /// Short identifier used on the command line.
    pub id: &'static str,
    /// Display name.
    pub name: &'static str,
    /// IMAP host. Empty for the custom preset.
    pub host: &'static str,
    /// IMAP port.
    pub port: u16,
    /// Whether the connection uses implicit TLS.
    pub tls: bool,
    /// Whether the preset has been tested end to end.
    pub verified: bool,
}

const fn preset(id: &'static str, name: &'static str, host: &'static str) -> Provider {
    Provider {
        id,
        name,
        host,
        port: 993,
        tls: true,
        verified: false,
    }
}

// Local bridges speak plaintext IMAP on the loopback interface.
const fn bridge(id: &'static str, name: &'static str) -> Provider {
    Provider {
        id,
        name,
        host: "127.0.0.1",
        port: 1143,
        tls: false,
        verified: false,
    }
}

static PROVIDERS: &[Provider] = &[
    Provider {
        verified: true,
        ..preset("dreamhost", "Dreamhost Webmail", "imap.dreamhost.com")
    },
    preset("gmail", "Gmail", "imap.gmail.com"),
    preset("outlook", "Outlook / Office 365", "outlook.office365.com"),
    preset("yahoo", "Yahoo Mail", "imap.mail.yahoo.com"),
    preset("aol", "AOL Mail", "imap.aol.com"),
    preset("icloud", "iCloud Mail", "imap.mail.me.com"),
    preset("zoho", "Zoho Mail", "imap.zoho.com"),
    preset("fastmail", "FastMail", "imap.fastmail.com"),
    preset("mailcom", "Mail.com", "imap.mail.com"),
    preset("gmx", "GMX Mail", "imap.gmx.com"),
    preset("webde", "Web.de", "imap.web.de"),
    preset("att", "AT&T Mail", "imap.mail.att.net"),
    preset("verizon", "Verizon Mail", "imap.verizon.net"),
    preset("godaddy", "GoDaddy Email", "imap.secureserver.net"),
    preset("namecheap", "Namecheap Private Email", "mail.privateemail.com"),
    preset("amazon", "Amazon WorkMail", "imap.mail.us-west-2.awsapps.com"),
    bridge("protonmail", "ProtonMail Bridge"),
    bridge("tutanota", "Tutanota"),
    preset("custom", "Custom IMAP Server", ""),
];

/// Returns every preset, in display order.
#[must_use]
pub fn all() -> &'static [Provider] {
    PROVIDERS
}

/// Looks up a preset by id, ignoring case.
#[must_use]
pub fn lookup(id: &str) -> Option<&'static Provider> {
    PROVIDERS.iter().find(|p| p.id.eq_ignore_ascii_case(id))
}

impl Provider {
    /// Guesses a preset from an email address domain.
    #[must_use]
    pub fn from_email(email: &str) -> Option<&'static Self> {
        let domain = email.rsplit_once('@')?.1.to_lowercase();
        let id = match domain.as_str() {
            "gmail.com" | "googlemail.com" => "gmail",
            "outlook.com" | "hotmail.com" | "live.com" | "msn.com" => "outlook",
            "yahoo.com" | "ymail.com" => "yahoo",
            "aol.com" => "aol",
            "icloud.com" | "me.com" | "mac.com" => "icloud",
            "zoho.com" => "zoho",
            "fastmail.com" | "fastmail.fm" => "fastmail",
            "mail.com" => "mailcom",
            "gmx.com" | "gmx.net" => "gmx",
            "web.de" => "webde",
            "att.net" => "att",
            "verizon.net" => "verizon",
            "proton.me" | "protonmail.com" => "protonmail",
            "tutanota.com" | "tuta.io" => "tutanota",
            _ => return None,
        };
        lookup(id)
    }

    /// Returns true if the preset names a concrete host.
    #[must_use]
    pub const fn has_host(&self) -> bool {
        !self.host.is_empty()
    }
}
