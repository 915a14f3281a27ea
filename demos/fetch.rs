use cez_pnd::{init_log_env, CezPnd, Credentials};

fn main() -> anyhow::Result<()> {
    init_log_env();

    let credentials = Credentials::from_env_values()?;
    let pnd = CezPnd::new()?;

    let Some(session) = pnd.login(&credentials) else {
        std::process::exit(1);
    };

    if let Some(data) = session.fetch_data() {
        println!("{}", serde_json::to_string(&data)?);
    }

    Ok(())
}
