// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration file rendering.
//!
//! Produce the two configuration files the charm installs on the unit: the
//! PHP module configuration (instead of editing the system-wide `php.ini`,
//! which something else might own), and the web server site definition.
//! Rendering is pure string production; file I/O is left to the caller to
//! figure out.

use minijinja::{context, Environment};
use std::path::Path;

/// PHP module configuration template.
///
/// Enabled as a PHP module named `nextcloud` so the tuning values live in
/// their own file under `mods-available`.
const PHP_MODULE_TEMPLATE: &str = "\
; Nextcloud upload and memory tuning.
; Managed by the charm; local edits will be overwritten.
max_file_uploads = {{ max_file_uploads }}
upload_max_filesize = {{ upload_max_filesize }}
post_max_size = {{ post_max_size }}
memory_limit = {{ memory_limit }}
";

/// Web server site template.
const APACHE_SITE_TEMPLATE: &str = "\
<VirtualHost *:80>
  DocumentRoot {{ document_root }}

  <Directory {{ document_root }}>
    Require all granted
    AllowOverride All
    Options FollowSymLinks MultiViews

    <IfModule mod_dav.c>
      Dav off
    </IfModule>
  </Directory>
</VirtualHost>
";

/// Context values for the PHP module configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhpModuleContext {
    pub max_file_uploads: u32,
    pub upload_max_filesize: String,
    pub post_max_size: String,
    pub memory_limit: String,
}

/// Render the PHP module configuration.
///
/// # Errors
///
/// - Return [`RenderError`] if the template fails to parse or render.
pub fn render_php_module(ctx: &PhpModuleContext) -> Result<String> {
    render(
        "nextcloud.ini",
        PHP_MODULE_TEMPLATE,
        context! {
            max_file_uploads => ctx.max_file_uploads,
            upload_max_filesize => &ctx.upload_max_filesize,
            post_max_size => &ctx.post_max_size,
            memory_limit => &ctx.memory_limit,
        },
    )
}

/// Render the web server site definition.
///
/// # Errors
///
/// - Return [`RenderError`] if the template fails to parse or render.
pub fn render_apache_site(document_root: impl AsRef<Path>) -> Result<String> {
    render(
        "nextcloud.conf",
        APACHE_SITE_TEMPLATE,
        context! {
            document_root => document_root.as_ref().to_string_lossy(),
        },
    )
}

fn render(name: &str, template: &str, ctx: minijinja::Value) -> Result<String> {
    let mut env = Environment::new();
    env.add_template(name, template)?;
    let rendered = env.get_template(name)?.render(ctx)?;

    Ok(rendered)
}

/// Template rendering failure.
#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct RenderError(#[from] minijinja::Error);

/// Friendly result alias :3
type Result<T, E = RenderError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    #[test]
    fn render_php_module_config() -> anyhow::Result<()> {
        let result = render_php_module(&PhpModuleContext {
            max_file_uploads: 50,
            upload_max_filesize: "512M".into(),
            post_max_size: "512M".into(),
            memory_limit: "512M".into(),
        })?;

        let expect = indoc! {"
            ; Nextcloud upload and memory tuning.
            ; Managed by the charm; local edits will be overwritten.
            max_file_uploads = 50
            upload_max_filesize = 512M
            post_max_size = 512M
            memory_limit = 512M
        "};

        assert_eq!(result, expect);

        Ok(())
    }

    #[test]
    fn render_apache_site_config() -> anyhow::Result<()> {
        let result = render_apache_site("/var/www/nextcloud")?;

        let expect = indoc! {"
            <VirtualHost *:80>
              DocumentRoot /var/www/nextcloud

              <Directory /var/www/nextcloud>
                Require all granted
                AllowOverride All
                Options FollowSymLinks MultiViews

                <IfModule mod_dav.c>
                  Dav off
                </IfModule>
              </Directory>
            </VirtualHost>
        "};

        assert_eq!(result, expect);

        Ok(())
    }
}
