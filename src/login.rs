//! Waiting for a user to log in through a browser page.
//!
//! The browser itself is driven elsewhere; this module only needs a
//! [`LoginPage`] that reports navigations, its current URL and its cookies.
//! [`await_login`] watches the page until the authentication cookie appears.

use std::future::Future;

use async_trait::async_trait;

use crate::{
    config::Site,
    session::{Cookie, Session},
};

#[derive(thiserror::Error, Debug)]
pub enum LoginError {
    #[error("left site: {0}")]
    LeftSite(String),
    #[error("left login page without logging in")]
    LeftLoginPage,
    #[error("login was cancelled")]
    Cancelled,
    #[error("browser error: {0}")]
    BrowserError(String),
}

#[async_trait]
pub trait LoginPage: Send + Sync {
    /// Resolves once the page has finished loading a new document.
    async fn wait_for_navigation(&self) -> Result<(), LoginError>;

    async fn url(&self) -> Result<String, LoginError>;

    async fn cookies(&self) -> Result<Vec<Cookie>, LoginError>;
}

async fn poll<P: LoginPage + ?Sized>(page: &P, site: &Site) -> Result<Session, LoginError> {
    loop {
        page.wait_for_navigation().await?;

        let url = page.url().await?;
        if !site.is_on_site(&url) {
            return Err(LoginError::LeftSite(url));
        }
        if site.is_login_url(&url) {
            debug!("Still on login page: {}", url);
            continue;
        }

        let session = Session::from_cookies(&page.cookies().await?);
        if !session.is_authenticated() {
            return Err(LoginError::LeftLoginPage);
        }

        info!("Logged in");
        return Ok(session);
    }
}

/// Polls `page` after every navigation until the user is logged in.
///
/// Fails as soon as the page leaves `site`, or navigates off the login page
/// without the authentication cookie being set. `cancelled` should resolve
/// when the browser disconnects or the page is closed.
pub async fn await_login<P, C>(page: &P, site: &Site, cancelled: C) -> Result<Session, LoginError>
where
    P: LoginPage + ?Sized,
    C: Future<Output = ()>,
{
    tokio::select! {
        res = poll(page, site) => res,
        _ = cancelled => Err(LoginError::Cancelled),
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::VecDeque, sync::Mutex};

    use tokio::sync::oneshot;

    use super::*;

    /// Replays a fixed list of navigations, then never navigates again.
    struct ScriptedPage {
        steps: Mutex<VecDeque<(String, Vec<Cookie>)>>,
        current: Mutex<(String, Vec<Cookie>)>,
    }

    impl ScriptedPage {
        fn new(steps: Vec<(&str, Vec<&str>)>) -> Self {
            let steps = steps
                .into_iter()
                .map(|(url, names)| {
                    let cookies = names
                        .iter()
                        .map(|name| Cookie {
                            name: name.to_string(),
                            value: "1".to_string(),
                        })
                        .collect();
                    (url.to_string(), cookies)
                })
                .collect();
            Self {
                steps: Mutex::new(steps),
                current: Mutex::new(("https://frontendmasters.com/login/".to_string(), vec![])),
            }
        }
    }

    #[async_trait]
    impl LoginPage for ScriptedPage {
        async fn wait_for_navigation(&self) -> Result<(), LoginError> {
            let next = self.steps.lock().unwrap().pop_front();
            match next {
                Some(step) => {
                    *self.current.lock().unwrap() = step;
                    Ok(())
                }
                None => std::future::pending().await,
            }
        }

        async fn url(&self) -> Result<String, LoginError> {
            Ok(self.current.lock().unwrap().0.clone())
        }

        async fn cookies(&self) -> Result<Vec<Cookie>, LoginError> {
            Ok(self.current.lock().unwrap().1.clone())
        }
    }

    #[tokio::test]
    async fn succeeds_once_logged_in() {
        let page = ScriptedPage::new(vec![
            ("https://frontendmasters.com/login/", vec!["pre"]),
            ("https://www.frontendmasters.com/login", vec!["pre"]),
            ("https://frontendmasters.com/dashboard/", vec!["pre", "wordpress_logged_in_x"]),
        ]);

        let session = await_login(&page, &Site::default(), std::future::pending())
            .await
            .unwrap();
        assert_eq!(session.as_str(), "pre=1;wordpress_logged_in_x=1");
    }

    #[tokio::test]
    async fn fails_when_leaving_site() {
        let page = ScriptedPage::new(vec![("https://accounts.example.com/", vec![])]);

        let err = await_login(&page, &Site::default(), std::future::pending())
            .await
            .unwrap_err();
        assert!(matches!(err, LoginError::LeftSite(_)), "unexpected error: {err}");
    }

    #[tokio::test]
    async fn fails_when_leaving_login_page_unauthenticated() {
        let page = ScriptedPage::new(vec![("https://frontendmasters.com/courses/", vec!["pre"])]);

        let err = await_login(&page, &Site::default(), std::future::pending())
            .await
            .unwrap_err();
        assert!(matches!(err, LoginError::LeftLoginPage), "unexpected error: {err}");
    }

    #[tokio::test]
    async fn cancelled_when_page_closes() {
        let page = ScriptedPage::new(vec![("https://frontendmasters.com/login/", vec![])]);
        let site = Site::default();
        let (closed_tx, closed_rx) = oneshot::channel::<()>();

        let login = await_login(&page, &site, async {
            let _ = closed_rx.await;
        });
        drop(closed_tx);

        let err = login.await.unwrap_err();
        assert!(matches!(err, LoginError::Cancelled), "unexpected error: {err}");
    }
}
