use super::super::args::*;

pub async fn dispatch(cli: Cli) -> anyhow::Result<()> {
    let config = super::load_config(cli.config.as_deref())?;

    match cli.cmd {
        Command::Discover(args) => super::merchant::discover(config, args).await,
        Command::Search(args) => super::merchant::search(config, args).await,
        Command::Resolve(args) => super::merchant::resolve(config, args).await,
        Command::Call(args) => super::merchant::call(config, args).await,
        Command::Mandate(args) => super::mandate::run(config, args),
        Command::Keygen(args) => super::key::keygen(args),
        Command::Jwk => super::key::jwk(config),
    }
}
