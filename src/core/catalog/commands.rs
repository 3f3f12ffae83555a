//! Command bodies for each provisioning step.
//!
//! Bodies run inside a subshell on the target, so `exit` ends only the step.
//! Only sanitized values (domain, paths, generated names) are interpolated
//! into command text; everything else travels in quoted heredocs.

use crate::utils::shell;

use super::{templates, StepCatalog};

const APT: &str = "apt-get -y -o DPkg::Lock::Timeout=300";
const NONINTERACTIVE: &str = "export DEBIAN_FRONTEND=noninteractive";

pub(super) fn preflight(_: &StepCatalog) -> String {
    r#"if [ "$(id -u)" -ne 0 ]; then echo "pre-flight: must run as root (uid $(id -u))"; exit 1; fi
command -v apt-get >/dev/null 2>&1 || { echo "pre-flight: apt-get not found, a Debian/Ubuntu host is required"; exit 1; }
command -v systemctl >/dev/null 2>&1 || { echo "pre-flight: systemd is required"; exit 1; }
avail_kb=$(df -Pk / | awk 'NR==2 {print $4}')
if [ "${avail_kb:-0}" -lt 1048576 ]; then echo "pre-flight: less than 1 GiB free on /"; exit 1; fi
if [ -r /etc/os-release ]; then . /etc/os-release; echo "pre-flight: ${PRETTY_NAME:-unknown distribution}"; fi
echo "pre-flight: ok""#
        .to_string()
}

pub(super) fn prerequisites(_: &StepCatalog) -> String {
    format!(
        "set -e\n{noninteractive}\n{apt} update || (sleep 5 && {apt} update)\n{apt} install unzip curl ca-certificates software-properties-common\ncommand -v curl >/dev/null && command -v unzip >/dev/null && echo \"prerequisites: ok\"",
        noninteractive = NONINTERACTIVE,
        apt = APT,
    )
}

pub(super) fn install_nginx(_: &StepCatalog) -> String {
    format!(
        r#"set -e
{noninteractive}
if command -v nginx >/dev/null 2>&1; then echo "nginx already installed"; else {apt} install nginx; fi
systemctl enable nginx
systemctl start nginx
systemctl is-active --quiet nginx || {{ echo "nginx is not running"; exit 1; }}
nginx -v"#,
        noninteractive = NONINTERACTIVE,
        apt = APT,
    )
}

pub(super) fn install_mysql(_: &StepCatalog) -> String {
    format!(
        r#"set -e
{noninteractive}
if command -v mysql >/dev/null 2>&1; then echo "MySQL/MariaDB already installed"; else {apt} install mysql-server || {apt} install default-mysql-server; fi
if systemctl list-unit-files | grep -q "^mysql.service"; then unit=mysql
elif systemctl list-unit-files | grep -q "^mariadb.service"; then unit=mariadb
else echo "No mysql/mariadb systemd service found"; exit 1; fi
systemctl enable "$unit"
systemctl start "$unit"
mysqladmin ping >/dev/null 2>&1 || {{ echo "database server not answering"; exit 1; }}
echo "database server: $unit running""#,
        noninteractive = NONINTERACTIVE,
        apt = APT,
    )
}

pub(super) fn install_php(catalog: &StepCatalog) -> String {
    let php = catalog.php_version();
    let v = php.as_str();
    let packages = [
        "fpm", "mysql", "curl", "gd", "mbstring", "xml", "zip", "intl", "soap", "bcmath", "imagick",
    ]
    .iter()
    .map(|ext| format!("php{}-{}", v, ext))
    .collect::<Vec<_>>()
    .join(" ");

    format!(
        r#"set -e
{noninteractive}
if [ -S {socket} ] && systemctl is-active --quiet {service}; then
  echo "PHP {v} already installed"
else
  if ! apt-cache show php{v}-fpm >/dev/null 2>&1; then
    add-apt-repository -y ppa:ondrej/php
    {apt} update
  fi
  {apt} install {packages}
fi
systemctl enable {service}
systemctl start {service}
for i in 1 2 3 4 5 6 7 8 9 10; do [ -S {socket} ] && break; sleep 1; done
[ -S {socket} ] || {{ echo "PHP-FPM socket {socket} missing"; exit 1; }}
php{v} -v | head -n 1"#,
        noninteractive = NONINTERACTIVE,
        apt = APT,
        socket = php.fpm_socket(),
        service = php.fpm_service(),
        v = v,
        packages = packages,
    )
}

pub(super) fn secure_mysql(_: &StepCatalog) -> String {
    let sql = "DELETE FROM mysql.user WHERE User='';\n\
               DELETE FROM mysql.user WHERE User='root' AND Host NOT IN ('localhost', '127.0.0.1', '::1');\n\
               DROP DATABASE IF EXISTS test;\n\
               DELETE FROM mysql.db WHERE Db='test' OR Db='test\\_%';\n\
               FLUSH PRIVILEGES;";

    format!(
        "{}\necho \"database server hardened\"",
        shell::heredoc("mysql", "WPSTACK_SQL_EOF", sql)
    )
}

pub(super) fn create_database(catalog: &StepCatalog) -> String {
    let secrets = catalog.secrets();
    let db = catalog.db_name();
    let user = &secrets.db_user;
    let password = secrets.db_password.expose();

    let sql = format!(
        "CREATE DATABASE IF NOT EXISTS `{db}` CHARACTER SET utf8mb4 COLLATE utf8mb4_unicode_ci;\n\
         CREATE USER IF NOT EXISTS '{user}'@'localhost' IDENTIFIED BY '{password}';\n\
         ALTER USER '{user}'@'localhost' IDENTIFIED BY '{password}';\n\
         GRANT ALL PRIVILEGES ON `{db}`.* TO '{user}'@'localhost';\n\
         FLUSH PRIVILEGES;",
        db = db,
        user = user,
        password = password,
    );

    format!(
        "set -e\n{}\nmysql -N -e \"SHOW DATABASES LIKE '{db}'\" | grep -qx '{db}' || {{ echo \"database {db} was not created\"; exit 1; }}\necho \"database {db} ready for {user}\"",
        shell::heredoc("mysql", "WPSTACK_SQL_EOF", &sql),
        db = db,
        user = user,
    )
}

pub(super) fn download_wordpress(catalog: &StepCatalog) -> String {
    let root = shell::quote_path(catalog.web_root());
    let version_file = shell::quote_path(&format!("{}/wp-includes/version.php", catalog.web_root()));

    format!(
        r#"set -e
if [ -f {version_file} ]; then
  echo "WordPress already present in {root}"
else
  mkdir -p {root}
  archive=$(mktemp /tmp/wordpress-XXXXXX.tar.gz)
  curl -fsSL -o "$archive" https://wordpress.org/latest.tar.gz
  tar -xzf "$archive" -C {root} --strip-components=1
  rm -f "$archive"
fi
[ -f {version_file} ] || {{ echo "WordPress files missing from {root}"; exit 1; }}
grep -o "wp_version = '[^']*'" {version_file}"#,
        root = root,
        version_file = version_file,
    )
}

pub(super) fn write_wp_config(catalog: &StepCatalog) -> String {
    let path = shell::quote_path(&format!("{}/wp-config.php", catalog.web_root()));

    format!(
        "set -e\n{}\ngrep -q \"DB_NAME\" {path} || {{ echo \"wp-config.php was not written\"; exit 1; }}\necho \"wp-config.php written\"",
        shell::heredoc(
            &format!("cat > {}", path),
            "WPSTACK_WPCONFIG_EOF",
            &templates::wp_config(catalog)
        ),
        path = path,
    )
}

pub(super) fn set_permissions(catalog: &StepCatalog) -> String {
    let root = shell::quote_path(catalog.web_root());
    let config = shell::quote_path(&format!("{}/wp-config.php", catalog.web_root()));

    shell::chain(&[
        format!("chown -R www-data:www-data {}", root),
        format!("find {} -type d -exec chmod 755 {{}} +", root),
        format!("find {} -type f -exec chmod 644 {{}} +", root),
        format!("chmod 640 {}", config),
        format!("echo \"permissions set on {}\"", catalog.web_root()),
    ])
}

pub(super) fn write_nginx_vhost(catalog: &StepCatalog) -> String {
    let available = shell::quote_path(&format!("/etc/nginx/sites-available/{}", catalog.domain()));
    let enabled = shell::quote_path(&format!("/etc/nginx/sites-enabled/{}", catalog.domain()));

    format!(
        "set -e\n{}\nln -sf {available} {enabled}\nrm -f /etc/nginx/sites-enabled/default\nnginx -t",
        shell::heredoc(
            &format!("cat > {}", available),
            "WPSTACK_NGINX_EOF",
            &templates::nginx_vhost(catalog)
        ),
        available = available,
        enabled = enabled,
    )
}

pub(super) fn reload_nginx(catalog: &StepCatalog) -> String {
    format!(
        r#"systemctl reload nginx || systemctl restart nginx
systemctl is-active --quiet nginx || {{ echo "nginx is not running"; exit 1; }}
code=$(curl -s -o /dev/null -w "%{{http_code}}" -H "Host: {domain}" http://127.0.0.1/ || true)
echo "nginx answered $code for {domain}""#,
        domain = catalog.domain(),
    )
}

pub(super) fn install_certbot(_: &StepCatalog) -> String {
    format!(
        "set -e\n{}\nif command -v certbot >/dev/null 2>&1; then echo \"certbot already installed\"; else {} install certbot python3-certbot-nginx; fi\ncertbot --version",
        NONINTERACTIVE, APT,
    )
}

pub(super) fn issue_certificate(catalog: &StepCatalog) -> String {
    let ini = shell::quote_path(&format!("/root/.wpstack/certbot-{}.ini", catalog.domain()));

    format!(
        "set -e\nmkdir -p /root/.wpstack\nchmod 700 /root/.wpstack\n{}\ntrap 'rm -f {ini}' EXIT\ncertbot --nginx -d {domain} --config {ini} --keep-until-expiring --redirect\n[ -d /etc/letsencrypt/live/{domain} ] || {{ echo \"no certificate found for {domain}\"; exit 1; }}",
        shell::heredoc(
            &format!("cat > {}", ini),
            "WPSTACK_CERTBOT_EOF",
            &templates::certbot_ini(catalog)
        ),
        ini = ini,
        domain = catalog.domain(),
    )
}

pub(super) fn configure_renewal(_: &StepCatalog) -> String {
    r#"set -e
if systemctl list-unit-files | grep -q "^certbot.timer"; then
  systemctl enable certbot.timer
  systemctl start certbot.timer
  echo "renewal: certbot.timer active"
else
  echo "0 3,15 * * * root certbot renew --quiet --deploy-hook 'systemctl reload nginx'" > /etc/cron.d/wpstack-certbot
  echo "renewal: cron entry installed"
fi
certbot renew --dry-run"#
        .to_string()
}

pub(super) fn final_verification(catalog: &StepCatalog) -> String {
    let php = catalog.php_version();

    format!(
        r#"failed=0
for unit in nginx {service}; do
  systemctl is-active --quiet "$unit" || {{ echo "verify: $unit not running"; failed=1; }}
done
mysqladmin ping >/dev/null 2>&1 || {{ echo "verify: database server not answering"; failed=1; }}
code=$(curl -s -o /dev/null -w "%{{http_code}}" --resolve {domain}:443:127.0.0.1 https://{domain}/wp-admin/install.php || true)
case "$code" in
  2*|3*) echo "verify: https://{domain} answered $code" ;;
  *) echo "verify: https://{domain} answered '$code'"; failed=1 ;;
esac
[ "$failed" -eq 0 ] || exit 1
echo "verify: ok""#,
        service = php.fpm_service(),
        domain = catalog.domain(),
    )
}
