//! Window-level key listeners with scoped registration.
//!
//! `KeyRegistry::listen` hands back a `ListenerGuard`; dropping the guard
//! removes the listener, so a surface that goes away takes its shortcuts
//! with it.

use std::sync::{Arc, Mutex, MutexGuard, Weak};

use crate::logging::{log, obj, v_str, Domain, Level};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Key {
    Tab,
    Enter,
    Escape,
    Char(char),
    Other(String),
}

impl Key {
    /// DOM-style key names (`"Tab"`, `"Enter"`, `"a"`).
    pub fn parse(name: &str) -> Self {
        match name {
            "Tab" => Key::Tab,
            "Enter" => Key::Enter,
            "Escape" => Key::Escape,
            _ => {
                let mut chars = name.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Key::Char(c),
                    _ => Key::Other(name.to_string()),
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyEvent {
    pub key: Key,
    pub default_prevented: bool,
}

impl KeyEvent {
    pub fn new(key: Key) -> Self {
        Self { key, default_prevented: false }
    }

    pub fn prevent_default(&mut self) {
        self.default_prevented = true;
    }
}

type Listener = Box<dyn FnMut(&mut KeyEvent) + Send>;

#[derive(Default)]
struct Listeners {
    next_id: u64,
    entries: Vec<(u64, Listener)>,
}

#[derive(Clone, Default)]
pub struct KeyRegistry {
    inner: Arc<Mutex<Listeners>>,
}

impl KeyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(inner: &Mutex<Listeners>) -> MutexGuard<'_, Listeners> {
        inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn listen<F>(&self, listener: F) -> ListenerGuard
    where
        F: FnMut(&mut KeyEvent) + Send + 'static,
    {
        let mut listeners = Self::lock(&self.inner);
        let id = listeners.next_id;
        listeners.next_id += 1;
        listeners.entries.push((id, Box::new(listener)));
        ListenerGuard { id, registry: Arc::downgrade(&self.inner) }
    }

    /// Runs every listener in registration order. Listeners must not touch
    /// the registry themselves.
    pub fn dispatch(&self, key: Key) -> KeyEvent {
        let mut event = KeyEvent::new(key);
        let mut listeners = Self::lock(&self.inner);
        for (_, listener) in listeners.entries.iter_mut() {
            listener(&mut event);
        }
        event
    }

    pub fn len(&self) -> usize {
        Self::lock(&self.inner).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Removes its listener when dropped.
pub struct ListenerGuard {
    id: u64,
    registry: Weak<Mutex<Listeners>>,
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        if let Some(inner) = self.registry.upgrade() {
            KeyRegistry::lock(&inner).entries.retain(|(id, _)| *id != self.id);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShortcutAction {
    Repeat,
    Advance,
}

/// Tab repeats at any time; Enter advances once the session is complete.
pub fn resolve_shortcut(key: &Key, completed: bool) -> Option<ShortcutAction> {
    match key {
        Key::Tab => Some(ShortcutAction::Repeat),
        Key::Enter if completed => Some(ShortcutAction::Advance),
        _ => None,
    }
}

/// Callbacks owned by the training controller.
#[derive(Clone)]
pub struct SessionHooks {
    pub on_repeat: Arc<dyn Fn() + Send + Sync>,
    pub on_advance: Arc<dyn Fn() + Send + Sync>,
}

impl SessionHooks {
    pub fn new(
        on_repeat: impl Fn() + Send + Sync + 'static,
        on_advance: impl Fn() + Send + Sync + 'static,
    ) -> Self {
        Self { on_repeat: Arc::new(on_repeat), on_advance: Arc::new(on_advance) }
    }

    pub fn noop() -> Self {
        Self::new(|| {}, || {})
    }

    pub fn fire(&self, action: ShortcutAction) {
        match action {
            ShortcutAction::Repeat => (self.on_repeat)(),
            ShortcutAction::Advance => (self.on_advance)(),
        }
    }
}

/// Registers the results-screen shortcuts for the given completion state.
pub fn bind_shortcuts(registry: &KeyRegistry, hooks: SessionHooks, completed: bool) -> ListenerGuard {
    registry.listen(move |event| {
        if let Some(action) = resolve_shortcut(&event.key, completed) {
            event.prevent_default();
            log(
                Level::Debug,
                Domain::Input,
                "shortcut",
                obj(&[("action", v_str(match action {
                    ShortcutAction::Repeat => "repeat",
                    ShortcutAction::Advance => "advance",
                }))]),
            );
            hooks.fire(action);
        }
    })
}
