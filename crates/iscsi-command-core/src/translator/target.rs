//! Target URL and argument vector construction.

use std::fmt;

use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::ipc::types::CommandRequest;
use crate::runner::Invocation;

const SCHEME: &str = "iscsi";
const MASK: &str = "***";

/// `iscsi://[login%password@]portal`
///
/// Values are inserted literally; no percent-encoding is applied. The
/// `Display` impl masks the password.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct TargetUrl {
    portal: String,
    login: String,
    password: String,
    authenticated: bool,
}

impl TargetUrl {
    pub fn from_request(request: &CommandRequest) -> Self {
        let authenticated = request.has_credentials();
        let (login, password) = if authenticated {
            (request.auth_login.clone(), request.auth_password.clone())
        } else {
            (String::new(), String::new())
        };
        Self {
            portal: request.portal.clone(),
            login,
            password,
            authenticated,
        }
    }

    /// The URL handed to the tool, password included.
    pub fn expose(&self) -> String {
        self.render(&self.password)
    }

    fn render(&self, password: &str) -> String {
        if self.authenticated {
            format!("{SCHEME}://{}%{password}@{}", self.login, self.portal)
        } else {
            format!("{SCHEME}://{}", self.portal)
        }
    }
}

impl fmt::Display for TargetUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(MASK))
    }
}

impl fmt::Debug for TargetUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TargetUrl").field(&self.to_string()).finish()
    }
}

/// `<program> <target-url> -i <initiator> -s -T <target-iqn>`
pub fn build_invocation(program: &str, request: &CommandRequest) -> Invocation {
    let url = TargetUrl::from_request(request);
    let command_line = format!(
        "{program} {url} -i {} -s -T {}",
        request.initiator_name, request.target_iqn
    );
    let args = vec![
        url.expose(),
        "-i".to_string(),
        request.initiator_name.clone(),
        "-s".to_string(),
        "-T".to_string(),
        request.target_iqn.clone(),
    ];
    Invocation::new(program, args, command_line)
}
