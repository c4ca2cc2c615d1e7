//! Application settings file (INI) consumed by the migration tooling and the
//! development server.

use anyhow::{Context, Result};
use chrono::Local;
use std::fs;
use std::path::Path;

use crate::config::Secrets;
use crate::schema::PrepdevConfig;

/// One `[section]` with its `key = value` lines, in insertion order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IniSection {
    pub name: String,
    pub entries: Vec<(String, String)>,
}

impl IniSection {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            entries: Vec::new(),
        }
    }

    fn set(mut self, key: &str, value: impl Into<String>) -> Self {
        self.entries.push((key.to_string(), value.into()));
        self
    }
}

/// An INI document written verbatim (no interpolation)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IniDocument {
    pub header: Vec<String>,
    pub sections: Vec<IniSection>,
}

#[cfg(test)]
impl IniDocument {
    fn section(&self, name: &str) -> Option<&IniSection> {
        self.sections.iter().find(|s| s.name == name)
    }

    fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.section(section)?
            .entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

impl IniDocument {
    pub fn render(&self) -> String {
        let mut out = String::new();
        for line in &self.header {
            out.push_str("; ");
            out.push_str(line);
            out.push('\n');
        }
        if !self.header.is_empty() {
            out.push('\n');
        }
        for section in &self.sections {
            out.push_str(&format!("[{}]\n", section.name));
            for (key, value) in &section.entries {
                if value.is_empty() {
                    out.push_str(&format!("{key} =\n"));
                } else {
                    out.push_str(&format!("{key} = {value}\n"));
                }
            }
            out.push('\n');
        }
        out
    }
}

/// Build the settings document for `config`
pub fn build(config: &PrepdevConfig, secrets: &Secrets) -> IniDocument {
    let pg = &config.postgres;
    let roles = &config.roles;
    let app = &config.settings;
    let level = app.log_level.as_str();

    let python_bool = |b: bool| if b { "True" } else { "False" };

    IniDocument {
        header: vec![format!(
            "Generated by prepdev on {}",
            Local::now().format("%Y-%m-%d %H:%M:%S")
        )],
        sections: vec![
            IniSection::new("sigma:database")
                .set("host", pg.host.clone())
                .set("port", pg.port.to_string())
                .set("name", config.database.name.clone()),
            IniSection::new(&format!("sigma:database:users:{}", roles.dba_user))
                .set("password", secrets.dba_password.clone()),
            IniSection::new("sigma:database:users:importacao")
                .set("name", roles.import_user.clone())
                .set("password", secrets.import_password.clone()),
            IniSection::new("sigma:database:groups:importacao")
                .set("name", roles.import_group.clone()),
            IniSection::new("sigma").set("debug", python_bool(app.debug)),
            IniSection::new("server:main")
                .set("use", "egg:waitress#main")
                .set("host", app.server_host.clone())
                .set("port", app.server_port.to_string()),
            IniSection::new("app:main").set("use", "egg:sigma"),
            IniSection::new("loggers").set("keys", "root, sigma, sigma.core.utils"),
            IniSection::new("handlers").set("keys", "console"),
            IniSection::new("formatters").set("keys", "generic, color"),
            IniSection::new("logger_root")
                .set("level", level)
                .set("handlers", "console"),
            IniSection::new("logger_sigma")
                .set("level", level)
                .set("qualname", "sigma")
                .set("handlers", ""),
            IniSection::new("logger_sigma.core.utils")
                .set("level", level)
                .set("qualname", "sigma.core.utils")
                .set("handlers", ""),
            IniSection::new("handler_console")
                .set("class", "StreamHandler")
                .set("args", "(sys.stderr,)")
                .set("level", "NOTSET")
                .set("formatter", "color"),
            IniSection::new("formatter_generic").set(
                "format",
                "%(asctime)s %(levelname)-5.5s [%(name)s][%(threadName)s] %(message)s",
            ),
            IniSection::new("formatter_color")
                .set("class", "colorlog.ColoredFormatter")
                .set(
                    "format",
                    "%(asctime)s %(log_color)s%(levelname)-5.5s%(reset)s \
                     %(bg_blue)s[%(name)s]%(reset)s %(message)s",
                )
                .set("datefmt", "%Y/%m/%d %H:%M:%S"),
        ],
    }
}

/// Write `doc` to `path`, readable by the owner only
pub fn write(doc: &IniDocument, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Could not create {}", parent.display()))?;
    }
    fs::write(path, doc.render())
        .with_context(|| format!("Could not write settings file {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))
            .with_context(|| format!("Could not restrict {}", path.display()))?;
    }

    log::info!("Wrote settings to {}", path.display());
    Ok(())
}
