use crate::cli::args::CliArgs;

pub fn validate(args: &CliArgs) -> Result<(), String> {
    if let Some(url) = args.url.as_deref() {
        if reqwest::Url::parse(url).is_err() {
            return Err(format!("invalid --url '{url}': expected an absolute URL"));
        }
    }
    if let Some(proxy) = args.proxy.as_deref() {
        if reqwest::Url::parse(proxy).is_err() {
            return Err(format!("invalid --px '{proxy}': expected an absolute URL"));
        }
    }
    if let Some(timeout) = args.timeout {
        if timeout == 0 {
            return Err("invalid --timeout, expected positive integer".to_string());
        }
    }
    if let Some(workers) = args.activation_workers {
        if workers == 0 {
            return Err("invalid --aw, expected positive integer".to_string());
        }
    }
    if let Some(workers) = args.generic_workers {
        if workers == 0 {
            return Err("invalid --gw, expected positive integer".to_string());
        }
    }
    if let Some(reps) = args.pattern_repetitions {
        if reps == 0 {
            return Err("invalid --reps, expected positive integer".to_string());
        }
    }
    if let Some(rate) = args.submission_rate {
        if rate == 0 {
            return Err("invalid --sr, expected positive integer".to_string());
        }
    }
    Ok(())
}
