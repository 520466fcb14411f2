/// User-visible notifications. The CLI surfaces these as log records;
/// other frontends can plug in their own channel.
pub trait Notifier: Send + Sync {
    fn notify_error(&self, title: &str, message: &str);
    fn notify_info(&self, title: &str, message: &str);
}

/// Log-backed notifier used by the CLI.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify_error(&self, title: &str, message: &str) {
        log::error!("{}: {}", title, message);
    }

    fn notify_info(&self, title: &str, message: &str) {
        log::info!("{}: {}", title, message);
    }
}

/// Summary notifications carry the link as an HTML anchor.
pub fn html_link(url: &str) -> String {
    format!("<a href=\"{}\">{}</a>", url, url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_html_link() {
        assert_eq!(
            html_link("https://yapi.example.com/project/1/interface/api/9"),
            "<a href=\"https://yapi.example.com/project/1/interface/api/9\">https://yapi.example.com/project/1/interface/api/9</a>"
        );
    }
}
