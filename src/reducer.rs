//! Helpers for building reducers out of smaller ones.

#[cfg(test)]
mod tests;

/// A reducer that applies events to the state in place.
pub type Reducer<S, E> = Box<dyn Fn(&mut S, &E) + Send + Sync>;

/// Apply every reducer in order.
pub fn combine<S, E>(reducers: impl IntoIterator<Item = Reducer<S, E>>) -> Reducer<S, E>
where
    S: 'static,
    E: 'static,
{
    let reducers: Vec<_> = reducers.into_iter().collect();
    Box::new(move |state, event| {
        for reducer in &reducers {
            reducer(state, event);
        }
    })
}

/// Lift a reducer of a part of the state to the whole state.
///
/// Events that `event` does not recognize are ignored.
pub fn pullback<S, E, G, GE>(
    reducer: impl Fn(&mut S, &E) + Send + Sync + 'static,
    value: impl Fn(&mut G) -> &mut S + Send + Sync + 'static,
    event: impl Fn(&GE) -> Option<&E> + Send + Sync + 'static,
) -> Reducer<G, GE>
where
    S: 'static,
    E: 'static,
{
    Box::new(move |state, e| {
        if let Some(e) = event(e) {
            reducer(value(state), e)
        }
    })
}

/// Like [`pullback`], for a part of the state that may be absent.
///
/// Events are ignored while the part is absent.
pub fn pullback_optional<S, E, G, GE>(
    reducer: impl Fn(&mut S, &E) + Send + Sync + 'static,
    value: impl Fn(&mut G) -> Option<&mut S> + Send + Sync + 'static,
    event: impl Fn(&GE) -> Option<&E> + Send + Sync + 'static,
) -> Reducer<G, GE>
where
    S: 'static,
    E: 'static,
{
    Box::new(move |state, e| {
        if let (Some(e), Some(state)) = (event(e), value(state)) {
            reducer(state, e)
        }
    })
}
