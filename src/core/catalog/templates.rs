//! Configuration files written to the target machine.

use crate::utils::shell;

use super::StepCatalog;

pub(super) fn wp_config(catalog: &StepCatalog) -> String {
    let secrets = catalog.secrets();
    let domain = catalog.domain();

    let mut title = shell::single_line(catalog.site_title());
    while title.contains("*/") {
        title = title.replace("*/", "");
    }

    let salts = secrets
        .salts
        .iter()
        .map(|(name, value)| format!("define('{}', '{}');", name, value.expose()))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"<?php
/**
 * WordPress configuration for {domain}
 * Site: {title}
 */

/** Database settings */
define('DB_NAME',     '{db_name}');
define('DB_USER',     '{db_user}');
define('DB_PASSWORD', '{db_password}');
define('DB_HOST',     'localhost');
define('DB_CHARSET',  'utf8mb4');
define('DB_COLLATE',  '');

/** Authentication unique keys and salts */
{salts}

$table_prefix = 'wp_';

define('WP_DEBUG',         false);
define('WP_DEBUG_LOG',     false);
define('WP_DEBUG_DISPLAY', false);

define('DISALLOW_FILE_EDIT', true);
define('WP_AUTO_UPDATE_CORE', 'minor');

define('FORCE_SSL_ADMIN', true);
if (isset($_SERVER['HTTP_X_FORWARDED_PROTO']) && $_SERVER['HTTP_X_FORWARDED_PROTO'] === 'https') {{
    $_SERVER['HTTPS'] = 'on';
}}

define('WP_SITEURL', 'https://{domain}');
define('WP_HOME',    'https://{domain}');

if (!defined('ABSPATH')) {{
    define('ABSPATH', __DIR__ . '/');
}}

require_once ABSPATH . 'wp-settings.php';
"#,
        domain = domain,
        title = title,
        db_name = catalog.db_name(),
        db_user = secrets.db_user,
        db_password = secrets.db_password.expose(),
        salts = salts,
    )
}

pub(super) fn nginx_vhost(catalog: &StepCatalog) -> String {
    format!(
        r#"server {{
    listen 80;
    listen [::]:80;
    server_name {domain};
    root {web_root};
    index index.php index.html index.htm;

    add_header X-Frame-Options "SAMEORIGIN" always;
    add_header X-Content-Type-Options "nosniff" always;
    add_header Referrer-Policy "strict-origin-when-cross-origin" always;

    access_log /var/log/nginx/{domain}.access.log;
    error_log  /var/log/nginx/{domain}.error.log;

    client_max_body_size 64M;

    gzip on;
    gzip_vary on;
    gzip_proxied any;
    gzip_comp_level 6;
    gzip_types text/plain text/css application/json application/javascript text/xml application/xml application/xml+rss text/javascript image/svg+xml;

    location / {{
        try_files $uri $uri/ /index.php?$args;
    }}

    location ~ \.php$ {{
        include snippets/fastcgi-php.conf;
        fastcgi_pass unix:{socket};
    }}

    location ~ /\. {{
        deny all;
    }}

    location ~* /(wp-config\.php|readme\.html|license\.txt) {{
        deny all;
    }}

    location ~* \.(css|gif|ico|jpeg|jpg|js|png|svg|woff|woff2|ttf|eot)$ {{
        expires 30d;
        add_header Cache-Control "public, immutable";
    }}
}}
"#,
        domain = catalog.domain(),
        web_root = catalog.web_root(),
        socket = catalog.php_version().fpm_socket(),
    )
}

/// certbot configuration carrying the registration email, kept off argv.
pub(super) fn certbot_ini(catalog: &StepCatalog) -> String {
    format!(
        "email = {}\nagree-tos = true\nnon-interactive = true\n",
        shell::single_line(catalog.admin_email())
    )
}
