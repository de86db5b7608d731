//! `entrywatch resolve` - print the backing namespace for a tenant

use clap::{ArgGroup, Args};

use entrywatch_common::{RoutingPolicy, Tenant, DEFAULT_TENANT};

use crate::Result;

/// Print the namespace a tenant's entries land in
#[derive(Args, Debug)]
#[command(group(ArgGroup::new("policy").required(true).args(["mirror", "destination"])))]
pub struct ResolveArgs {
    /// Tenant namespace
    #[arg(long, default_value = DEFAULT_TENANT)]
    pub tenant: String,

    /// Mirror routing: each tenant gets its own backing namespace
    #[arg(long)]
    pub mirror: bool,

    /// Fixed routing into this backing namespace
    #[arg(long)]
    pub destination: Option<String>,
}

impl ResolveArgs {
    fn policy(&self) -> RoutingPolicy {
        match &self.destination {
            Some(destination) => RoutingPolicy::fixed(destination.as_str()),
            None => RoutingPolicy::Mirror,
        }
    }
}

/// Run the resolve command
pub async fn run(args: ResolveArgs) -> Result<()> {
    let backing = args.policy().resolve(&Tenant::new(args.tenant.as_str()));
    println!("{backing}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        args: ResolveArgs,
    }

    fn parse(argv: &[&str]) -> std::result::Result<ResolveArgs, clap::Error> {
        TestCli::try_parse_from(std::iter::once("resolve").chain(argv.iter().copied()))
            .map(|c| c.args)
    }

    #[test]
    fn mirror_flag_selects_mirror() {
        let args = parse(&["--tenant", "team-a", "--mirror"]).unwrap();
        assert_eq!(args.policy(), RoutingPolicy::Mirror);
        assert_eq!(
            args.policy().resolve(&Tenant::new("team-a")).as_str(),
            "team-a"
        );
    }

    #[test]
    fn destination_selects_fixed() {
        let args = parse(&["--destination", "from-k8s"]).unwrap();
        assert_eq!(args.tenant, "ns1");
        assert_eq!(args.policy(), RoutingPolicy::fixed("from-k8s"));
    }

    #[test]
    fn policy_is_required_and_exclusive() {
        assert!(parse(&["--tenant", "ns1"]).is_err());
        assert!(parse(&["--mirror", "--destination", "x"]).is_err());
    }
}
