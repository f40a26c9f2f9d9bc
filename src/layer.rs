//! One entry of a router's stack: a compiled path pattern plus what runs when
//! it matches.

use crate::error::{Error, PatternError};
use crate::handler::Handler;
use crate::pattern::{Key, Match, Pattern, PatternOptions};
use crate::route::Route;

pub(crate) enum Endpoint {
    Handler(Handler),
    Route(Route),
}

pub(crate) struct Layer {
    pattern: Pattern,
    endpoint: Endpoint,
    name: String,
}

impl Layer {
    pub(crate) fn new(path: &str, options: PatternOptions, handler: Handler) -> Result<Self, PatternError> {
        let name = handler.name().to_owned();
        Ok(Self { pattern: Pattern::compile(path, options)?, endpoint: Endpoint::Handler(handler), name })
    }

    pub(crate) fn route(route: Route, options: PatternOptions) -> Result<Self, PatternError> {
        let pattern = Pattern::compile(route.path(), options)?;
        Ok(Self { pattern, endpoint: Endpoint::Route(route), name: "bound dispatch".to_owned() })
    }

    /// Tests `path` against the pattern. Pure: the same input always gives the
    /// same answer.
    pub(crate) fn matches(&self, path: &str) -> Result<Option<Match>, Error> {
        self.pattern.matches(path)
    }

    pub(crate) fn keys(&self) -> &[Key] {
        self.pattern.keys()
    }

    pub(crate) fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub(crate) fn as_route(&self) -> Option<&Route> {
        match &self.endpoint {
            Endpoint::Route(route) => Some(route),
            Endpoint::Handler(_) => None,
        }
    }

    pub(crate) fn as_route_mut(&mut self) -> Option<&mut Route> {
        match &mut self.endpoint {
            Endpoint::Route(route) => Some(route),
            Endpoint::Handler(_) => None,
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }
}
