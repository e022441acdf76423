use std::net::IpAddr;
use tracing::debug;

use crate::security::{account::Account, session::Session, SecurityContext};

/// The account may act on this request only while it can log in and the
/// client address satisfies its allow-net mask. A refusal affects this
/// request only; the session is kept.
pub fn permit(
    ctx: &SecurityContext,
    session: &mut Session,
    account: Option<Account>,
    ip: IpAddr,
) -> Option<Account> {
    let account = account?;
    if !ctx.accounts().account_can_login(&account) {
        debug!("account {} cannot log in", account.username);
        return None;
    }
    if ctx.sessions().fail_allow_net(session, &account, ip) {
        debug!(%ip, "account {} not allowed from this address", account.username);
        return None;
    }
    Some(account)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::config::SecurityConfig;
    use crate::security::tests::{account, context_with};

    const INSIDE: IpAddr = IpAddr::V4(std::net::Ipv4Addr::new(10, 1, 2, 3));
    const OUTSIDE: IpAddr = IpAddr::V4(std::net::Ipv4Addr::new(8, 8, 8, 8));

    #[test]
    fn allow_net_restricts_per_request() {
        let alice = Account {
            allow_net: Some("10.0.0.0/8".to_string()),
            ..account("alice", "secret")
        };
        let ctx = context_with(vec![alice.clone()], SecurityConfig::default());

        let mut session = Session {
            username: Some("alice".to_string()),
            ..Session::default()
        };
        assert!(permit(&ctx, &mut session, Some(alice.clone()), INSIDE).is_some());
        assert!(permit(&ctx, &mut session, Some(alice), OUTSIDE).is_none());
        assert!(session.is_logged_in());
    }

    #[test]
    fn disabled_account_is_refused() {
        let bob = Account {
            disabled: true,
            ..account("bob", "secret")
        };
        let ctx = context_with(vec![bob.clone()], SecurityConfig::default());
        assert!(permit(&ctx, &mut Session::default(), Some(bob), INSIDE).is_none());
        assert!(permit(&ctx, &mut Session::default(), None, INSIDE).is_none());
    }
}
