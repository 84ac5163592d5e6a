use indicatif::{ProgressBar, ProgressStyle};

const BYTES_TEMPLATE: &str =
    "{msg}\n[{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}) ETA: {eta}";
const SPINNER_TEMPLATE: &str = "{spinner:.blue} {msg} {bytes} ({bytes_per_sec})";

/// Byte counter for one file. Unknown sizes get a spinner; `show = false`
/// returns a hidden bar so callers never branch on it.
pub fn download_bar(total: Option<u64>, name: &str, show: bool) -> ProgressBar {
    if !show {
        return ProgressBar::hidden();
    }
    let bar = match total {
        Some(total) => ProgressBar::new(total).with_style(
            ProgressStyle::default_bar()
                .template(BYTES_TEMPLATE)
                .expect("progress template should always parse")
                .progress_chars("█▓▒░ "),
        ),
        None => ProgressBar::new_spinner().with_style(
            ProgressStyle::default_spinner()
                .template(SPINNER_TEMPLATE)
                .expect("spinner template should always parse"),
        ),
    };
    bar.set_message(name.to_string());
    bar
}
