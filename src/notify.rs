//! visible notifications and haptic feedback
//!
//! delivery is never guaranteed, a denied or missing notification surface just means the
//! notification doesn't show

use log::{debug, info, warn};
use notify_rust::Notification;

/// run when the user interacts with a notification
pub type Interaction = Box<dyn FnOnce() + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Granted,
    Denied,
    /// the platform has no notification surface at all
    Unavailable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NotificationHandle(pub u64);

/// the platform notification surface
pub trait NotificationSurface {
    fn request_permission(&mut self) -> Permission;

    /// # Errors
    /// if the notification couldn't be displayed
    fn show(
        &mut self,
        title: &str,
        body: &str,
        on_interact: Option<Interaction>,
    ) -> Result<NotificationHandle, String>;

    /// bring the application to the front
    fn focus_application(&mut self) {}
}

/// the haptic primitive, `pattern` alternates vibrate and pause lengths in milliseconds
pub trait Haptics {
    fn pulse(&mut self, pattern: &[u64]);
}

/// wraps the notification surface, asks for permission once and remembers the answer
pub struct NotificationDispatcher {
    surface: Box<dyn NotificationSurface>,
    permission: Option<Permission>,
}

impl NotificationDispatcher {
    #[must_use]
    pub fn new(surface: Box<dyn NotificationSurface>) -> Self {
        Self {
            surface,
            permission: None,
        }
    }

    pub fn request_permission(&mut self) -> bool {
        let permission = *self.permission.get_or_insert_with(|| {
            let permission = self.surface.request_permission();
            info!("notification permission: {permission:?}");
            permission
        });
        permission == Permission::Granted
    }

    /// shows a notification, `None` means nothing was shown
    pub fn notify(
        &mut self,
        title: &str,
        body: &str,
        on_interact: Option<Interaction>,
    ) -> Option<NotificationHandle> {
        if !self.request_permission() {
            debug!("not showing \"{title}\", notifications aren't permitted");
            return None;
        }
        match self.surface.show(title, body, on_interact) {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!("couldn't show notification \"{title}\": {e}");
                None
            }
        }
    }

    pub fn focus_application(&mut self) {
        self.surface.focus_application();
    }
}

/// the action id a click on the notification body reports
const OPEN_ACTION: &str = "default";

/// whether the action a notification reported back means the user wants the app
fn is_open_action(action: &str) -> bool {
    action == OPEN_ACTION
}

/// desktop notifications through the platform notification server
#[derive(Debug, Default)]
pub struct DesktopNotifier {
    app_name: String,
    next_handle: u64,
}

impl DesktopNotifier {
    #[must_use]
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            next_handle: 0,
        }
    }
}

impl NotificationSurface for DesktopNotifier {
    #[cfg(all(unix, not(target_os = "macos")))]
    fn request_permission(&mut self) -> Permission {
        match notify_rust::get_server_information() {
            Ok(server) => {
                debug!("notification server: {} {}", server.name, server.version);
                Permission::Granted
            }
            Err(e) => {
                warn!("no notification server: {e}");
                Permission::Unavailable
            }
        }
    }

    #[cfg(not(all(unix, not(target_os = "macos"))))]
    fn request_permission(&mut self) -> Permission {
        Permission::Granted
    }

    fn show(
        &mut self,
        title: &str,
        body: &str,
        on_interact: Option<Interaction>,
    ) -> Result<NotificationHandle, String> {
        let mut notification = Notification::new();
        notification.summary(title).body(body).appname(&self.app_name);
        match on_interact {
            #[cfg(all(unix, not(target_os = "macos")))]
            Some(on_interact) => show_with_action(notification, on_interact)?,
            _ => {
                notification.show().map_err(|e| e.to_string())?;
            }
        }
        self.next_handle += 1;
        Ok(NotificationHandle(self.next_handle))
    }
}

/// shows `notification` on its own thread and runs `on_interact` if it gets clicked.
/// returns once the server accepted or refused the notification
#[cfg(all(unix, not(target_os = "macos")))]
fn show_with_action(mut notification: Notification, on_interact: Interaction) -> Result<(), String> {
    use std::{sync::mpsc, thread};

    notification.action(OPEN_ACTION, "Open");
    let (shown, was_shown) = mpsc::channel();
    thread::spawn(move || match notification.show() {
        Ok(handle) => {
            let _ = shown.send(Ok(()));
            // blocks until the notification is clicked or closed
            handle.wait_for_action(|action| {
                if is_open_action(action) {
                    on_interact();
                }
            });
        }
        Err(e) => {
            let _ = shown.send(Err(e.to_string()));
        }
    });
    was_shown
        .recv()
        .map_err(|_| "notification thread went away".to_string())?
}

#[cfg(test)]
mod tests {
    use std::{cell::Cell, rc::Rc};

    use super::*;

    struct CountingSurface {
        answer: Permission,
        asked: Rc<Cell<u32>>,
        shown: Rc<Cell<u32>>,
    }

    impl NotificationSurface for CountingSurface {
        fn request_permission(&mut self) -> Permission {
            self.asked.set(self.asked.get() + 1);
            self.answer
        }

        fn show(&mut self, _: &str, _: &str, _: Option<Interaction>) -> Result<NotificationHandle, String> {
            self.shown.set(self.shown.get() + 1);
            Ok(NotificationHandle(u64::from(self.shown.get())))
        }
    }

    fn dispatcher(answer: Permission) -> (NotificationDispatcher, Rc<Cell<u32>>, Rc<Cell<u32>>) {
        let asked = Rc::new(Cell::new(0));
        let shown = Rc::new(Cell::new(0));
        let surface = CountingSurface {
            answer,
            asked: asked.clone(),
            shown: shown.clone(),
        };
        (NotificationDispatcher::new(Box::new(surface)), asked, shown)
    }

    #[test]
    fn permission_is_asked_once() {
        let (mut dispatcher, asked, shown) = dispatcher(Permission::Granted);
        assert!(dispatcher.notify("a", "b", None).is_some());
        assert!(dispatcher.notify("a", "b", None).is_some());
        assert_eq!(asked.get(), 1);
        assert_eq!(shown.get(), 2);
    }

    #[test]
    fn only_a_click_opens_the_app() {
        assert!(is_open_action("default"));
        assert!(!is_open_action("__closed"));
        assert!(!is_open_action(""));
    }

    #[test]
    fn denied_permission_shows_nothing() {
        let (mut dispatcher, asked, shown) = dispatcher(Permission::Denied);
        assert!(dispatcher.notify("a", "b", None).is_none());
        assert!(!dispatcher.request_permission());
        assert_eq!(asked.get(), 1);
        assert_eq!(shown.get(), 0);
    }
}
