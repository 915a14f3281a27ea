use cez_pnd::{init_log_env, CezPnd, Credentials};

fn main() -> anyhow::Result<()> {
    init_log_env();

    let credentials = Credentials::from_env_values()?;
    println!("credentials: {:?}", credentials);

    let pnd = CezPnd::new()?;
    match pnd.login(&credentials) {
        Some(session) => println!("JSESSIONID: {}", session.session_id()),
        None => println!("login failed, see the log above"),
    }

    Ok(())
}
