use std::fmt::Display;

use console::{style, StyledObject};

/// A reconciliation pass still talking to GitLab.
pub fn pending<D: Display>(text: D) -> StyledObject<D> {
    style(text).yellow().bright()
}

pub fn succeeded<D: Display>(text: D) -> StyledObject<D> {
    style(text).green().bright()
}

/// A pass that recorded failures or was skipped.
pub fn degraded<D: Display>(text: D) -> StyledObject<D> {
    style(text).red().bright()
}

pub fn title<D: Display>(text: D) -> StyledObject<D> {
    style(text).magenta().bold()
}

pub fn subdued<D: Display>(text: D) -> StyledObject<D> {
    style(text).dim()
}
