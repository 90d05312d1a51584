/*!
Visitor dispatch with fall-through along the parent chain.

A consumer implements `EventVisitor` and overrides the methods for the event
kinds it cares about. Unhandled kinds fall through to the handler of the
parent layer, ending at `visit_event`. The chain mirrors the taxonomy:

    CacheRequest / ScratchpadRequest -> request -> register -> core -> event
    McpuInstruction / InsnLatencyEvent        -> register -> core -> event
    McpuSetVvl                                            -> core -> event
    Fence / Finish / VectorWaiting            -> sync     -> core -> event

`dispatch` is the only place that matches on the variant tag; everything else
goes through the trait.
*/

use log::warn;

use super::{
    CacheRequest, Event, Fence, Finish, InsnLatencyEvent, McpuInstruction, McpuSetVvl,
    ScratchpadRequest, VectorWaiting,
};

/// Route an event to the most specific visitor method for its kind.
pub fn dispatch<V: EventVisitor + ?Sized>(ev: Event, v: &mut V) {
    match ev {
        Event::Cache(r) => v.visit_cache(r),
        Event::Scratchpad(r) => v.visit_scratchpad(r),
        Event::McpuInstruction(i) => v.visit_mcpu_instruction(i),
        Event::McpuSetVvl(r) => v.visit_set_vvl(r),
        Event::InsnLatency(r) => v.visit_insn_latency(r),
        Event::Fence(f) => v.visit_fence(f),
        Event::Finish(f) => v.visit_finish(f),
        Event::VectorWaiting(e) => v.visit_vector_waiting(e),
    }
}

pub trait EventVisitor {
    /// Final fall-through. Reaching it usually means a component received an
    /// event kind it has no business handling.
    fn visit_event(&mut self, ev: Event) {
        warn!("unhandled {} event reached the base handler", ev.kind_name());
    }

    fn visit_core_event(&mut self, ev: Event) {
        self.visit_event(ev);
    }

    fn visit_register_event(&mut self, ev: Event) {
        self.visit_core_event(ev);
    }

    fn visit_request(&mut self, ev: Event) {
        self.visit_register_event(ev);
    }

    fn visit_sync(&mut self, ev: Event) {
        self.visit_core_event(ev);
    }

    fn visit_cache(&mut self, r: CacheRequest) {
        self.visit_request(Event::Cache(r));
    }

    fn visit_scratchpad(&mut self, r: ScratchpadRequest) {
        self.visit_request(Event::Scratchpad(r));
    }

    fn visit_mcpu_instruction(&mut self, i: McpuInstruction) {
        self.visit_register_event(Event::McpuInstruction(i));
    }

    fn visit_set_vvl(&mut self, r: McpuSetVvl) {
        self.visit_core_event(Event::McpuSetVvl(r));
    }

    fn visit_insn_latency(&mut self, r: InsnLatencyEvent) {
        self.visit_register_event(Event::InsnLatency(r));
    }

    fn visit_fence(&mut self, f: Fence) {
        self.visit_sync(Event::Fence(f));
    }

    fn visit_finish(&mut self, f: Finish) {
        self.visit_sync(Event::Finish(f));
    }

    fn visit_vector_waiting(&mut self, e: VectorWaiting) {
        self.visit_sync(Event::VectorWaiting(e));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{AccessType, RegKind};

    #[derive(Default)]
    struct Recorder {
        cache: u32,
        request: u32,
        sync: u32,
        base: u32,
    }

    impl EventVisitor for Recorder {
        fn visit_event(&mut self, _ev: Event) {
            self.base += 1;
        }

        fn visit_request(&mut self, _ev: Event) {
            self.request += 1;
        }

        fn visit_sync(&mut self, _ev: Event) {
            self.sync += 1;
        }

        fn visit_cache(&mut self, _r: CacheRequest) {
            self.cache += 1;
        }
    }

    #[test]
    fn most_specific_handler_wins() {
        let mut v = Recorder::default();
        let r = CacheRequest::new(0x80, AccessType::Load, 0, 1, 0).with_destination(4, RegKind::Integer);
        dispatch(Event::Cache(r), &mut v);
        assert_eq!((v.cache, v.request, v.base), (1, 0, 0));
    }

    #[test]
    fn unhandled_kinds_fall_through() {
        let mut v = Recorder::default();
        // Scratchpad is not overridden: falls to visit_request.
        let r = ScratchpadRequest::new(0x0, crate::event::ScratchpadCommand::Read, 0, 1, 0, 0, 1);
        dispatch(Event::Scratchpad(r), &mut v);
        assert_eq!((v.cache, v.request), (0, 1));

        // Fence falls to visit_sync, never to visit_request.
        dispatch(Event::Fence(Fence::new(0, 1, 0)), &mut v);
        assert_eq!(v.sync, 1);

        // Finish also lands in sync; VVL falls through core to the base.
        dispatch(Event::Finish(Finish::new(0, 1, 0)), &mut v);
        assert_eq!(v.sync, 2);
        dispatch(
            Event::McpuSetVvl(McpuSetVvl::new(64, 1, 0, 1, 0)),
            &mut v,
        );
        assert_eq!(v.base, 1);
    }
}
