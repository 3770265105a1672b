//! # pwx-widgets — widget behaviors and the shared lifecycle core
//!
//! Each widget type implements [`WidgetBehavior`]; the fixed init /
//! update / destroy sequence lives in [`WidgetCore`] and is never
//! overridable. Behaviors speak to the page exclusively through
//! [`pwx_host::HostPage`], so every widget here runs unchanged against
//! the mock host in tests.

#![forbid(unsafe_code)]

mod banner;
mod carousel;
mod core;
mod custom;
mod grid;
mod markup;
mod popup;
mod recently_viewed;
mod sanitize;
mod settings;
mod slider;
mod triggers;

pub use banner::BannerBehavior;
pub use carousel::CarouselBehavior;
pub use crate::core::{RenderMode, RenderedView, WidgetBehavior, WidgetContext, WidgetCore};
pub use custom::CustomBehavior;
pub use grid::GridBehavior;
pub use popup::PopupBehavior;
pub use recently_viewed::RecentlyViewedBehavior;
pub use sanitize::sanitize_html;
pub use settings::Settings;
pub use slider::SliderBehavior;
pub use triggers::{Trigger, TriggerController};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WidgetError {
    #[error(transparent)]
    Template(#[from] pwx_template::TemplateError),
    #[error("{0}")]
    Render(String),
}
