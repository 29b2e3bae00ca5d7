mod charset;
mod present;

use log::info;
use log::warn;
use mp_core::PageError;
use mp_core::PageResult;
use mp_dom::ElementId;
use mp_html::HtmlParser;
use present::Label;
use std::path::PathBuf;
use std::process::ExitCode;
use std::rc::Rc;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Options {
    path: PathBuf,
    clicks: Vec<String>,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let result = parse_args(std::env::args().skip(1)).and_then(|options| run(&options));
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("minipage: {error}");
            ExitCode::FAILURE
        }
    }
}

fn parse_args(mut args: impl Iterator<Item = String>) -> PageResult<Options> {
    let mut path = None;
    let mut clicks = Vec::new();

    while let Some(arg) = args.next() {
        if arg == "--click" {
            let id = args.next().ok_or_else(|| {
                PageError::new("minipage.args.missing_click_id", "missing element id after --click")
            })?;
            clicks.push(id);
            continue;
        }
        if arg.starts_with("--") || path.is_some() {
            return Err(PageError::new(
                "minipage.args.unexpected",
                format!("unexpected argument `{arg}` (usage: minipage <file.html> [--click <id>]...)"),
            ));
        }
        path = Some(PathBuf::from(arg));
    }

    let path = path.ok_or_else(|| {
        PageError::new(
            "minipage.args.missing_path",
            "usage: minipage <file.html> [--click <id>]...",
        )
    })?;
    Ok(Options { path, clicks })
}

fn run(options: &Options) -> PageResult<()> {
    let bytes = std::fs::read(&options.path).map_err(|error| {
        PageError::new(
            "minipage.io.read_failed",
            format!("{}: {error}", options.path.display()),
        )
    })?;
    let source = charset::decode_html(&bytes);

    let mut page = HtmlParser::default().parse(&source);
    info!(
        "loaded {} ({} bytes, {} elements)",
        options.path.display(),
        bytes.len(),
        page.document().len()
    );

    // The page only keeps weak references; the labels live here.
    let mut labels: Vec<(ElementId, Rc<Label>)> = Vec::new();
    let explicit: Vec<(ElementId, String)> = page
        .document()
        .iter()
        .filter(|element| matches!(element.id(), ElementId::Explicit(_)))
        .map(|element| (element.id().clone(), element.text().unwrap_or_default().to_owned()))
        .collect();
    for (id, text) in explicit {
        let label = Rc::new(Label::new(&text));
        let handle: Rc<dyn mp_dom::BoundHandle> = label.clone();
        if page.bind_handle(&id, Rc::downgrade(&handle)) {
            labels.push((id, label));
        }
    }

    if let Some(title) = page.title() {
        println!("== {title} ==");
    }
    for line in present::content_lines(&page) {
        println!("{line}");
    }
    for line in present::report_lines(page.script_report()) {
        println!("{line}");
    }

    for id in &options.clicks {
        let target = ElementId::explicit(id.as_str());
        println!("-- click {target}");
        match page.click(&target) {
            Ok(Some(report)) => {
                for line in present::report_lines(&report) {
                    println!("{line}");
                }
            }
            Ok(None) => println!("(no handler)"),
            Err(error) => {
                warn!("{error}");
                println!("(unknown element)");
                continue;
            }
        }

        for (id, label) in &labels {
            if label.take_updated() {
                println!("{id} = {}", label.text());
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::Options;
    use super::parse_args;
    use std::path::PathBuf;

    fn args(values: &[&str]) -> impl Iterator<Item = String> {
        values
            .iter()
            .map(|value| (*value).to_owned())
            .collect::<Vec<_>>()
            .into_iter()
    }

    #[test]
    fn parses_path_and_repeated_clicks() {
        let options = parse_args(args(&["page.html", "--click", "go", "--click", "stop"]))
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(
            options,
            Options {
                path: PathBuf::from("page.html"),
                clicks: vec!["go".to_owned(), "stop".to_owned()],
            }
        );
    }

    #[test]
    fn reports_argument_errors_with_codes() {
        let code = |values: &[&str]| parse_args(args(values)).err().map(|error| error.code);
        assert_eq!(code(&[]), Some("minipage.args.missing_path"));
        assert_eq!(code(&["a.html", "--click"]), Some("minipage.args.missing_click_id"));
        assert_eq!(code(&["a.html", "b.html"]), Some("minipage.args.unexpected"));
        assert_eq!(code(&["--verbose"]), Some("minipage.args.unexpected"));
    }
}
