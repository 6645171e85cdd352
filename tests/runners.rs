use std::cell::Cell;
use std::rc::Rc;

use listenable::{autorun, computed, Config, Error, Item, Runtime, State, Value};
use mockall::predicate;

use crate::mock::{init_tracing, Recorder, SharedMock, Spy};

fn counter() -> Rc<Cell<usize>> {
	Rc::new(Cell::new(0))
}

#[test]
fn sum_follows_list_writes() {
	init_tracing();

	let rt = Runtime::default();
	let list = rt.list([1, 1, 2, 3]);
	let sum = rt.computed({
		let list = list.clone();
		move |cx| list.items(cx).iter().filter_map(Item::as_i64).sum::<i64>()
	});
	assert_eq!(*sum.get_once(), 7);

	let mock = SharedMock::new();
	let _subscription = sum.subscribe({
		let mock = mock.clone();
		move |value| mock.get().trigger(*value)
	});

	mock.get()
		.expect_trigger()
		.with(predicate::eq(17))
		.times(1)
		.return_const(());
	list.push(10).unwrap();
	mock.get().checkpoint();
	assert_eq!(*sum.get_once(), 17);

	mock.get()
		.expect_trigger()
		.with(predicate::eq(16))
		.times(1)
		.return_const(());
	list.splice(0, 1, Vec::<Item>::new()).unwrap();
	mock.get().checkpoint();
	assert_eq!(*sum.get_once(), 16);

	mock.get()
		.expect_trigger()
		.with(predicate::eq(18))
		.times(1)
		.return_const(());
	list.set(0, 3).unwrap();
	mock.get().checkpoint();
	assert_eq!(*sum.get_once(), 18);
}

#[test]
fn unread_keys_do_not_recompute() {
	let rt = Runtime::default();
	let record = rt.record([("a", 1), ("b", 2)]);
	let runs = counter();

	let a = rt.computed({
		let record = record.clone();
		let runs = runs.clone();
		move |cx| {
			runs.set(runs.get() + 1);
			record.get(cx, "a").and_then(|item| item.as_i64())
		}
	});

	let emissions = Recorder::new();
	let _subscription = a.subscribe({
		let emissions = emissions.clone();
		move |value: &Option<i64>| emissions.push(*value)
	});

	record.set("b", 5).unwrap();
	assert_eq!(runs.get(), 1);
	assert_eq!(emissions.len(), 0);

	record.set("a", 3).unwrap();
	assert_eq!(runs.get(), 2);
	assert_eq!(emissions.take(), vec![Some(3)]);
}

#[test]
fn equal_results_are_not_emitted() {
	let rt = Runtime::default();
	let list = rt.list([1, 2]);
	let positive = rt.computed({
		let list = list.clone();
		move |cx| list.len(cx) > 0
	});

	let emissions = Recorder::new();
	let _subscription = positive.subscribe({
		let emissions = emissions.clone();
		move |value: &bool| emissions.push(*value)
	});

	list.push(3).unwrap();
	assert_eq!(emissions.len(), 0);

	list.clear().unwrap();
	assert_eq!(emissions.take(), vec![false]);
}

#[test]
fn branches_not_taken_are_not_tracked() {
	let rt = Runtime::default();
	let flag = rt.record([("on", true)]);
	let left = rt.record([("v", 1)]);
	let right = rt.record([("v", 2)]);
	let runs = counter();

	let value = rt.computed({
		let (flag, left, right, runs) = (flag.clone(), left.clone(), right.clone(), runs.clone());
		move |cx| {
			runs.set(runs.get() + 1);
			let on = flag.get(cx, "on").and_then(|item| item.as_bool()).unwrap_or(false);
			let side = if on { &left } else { &right };
			side.get(cx, "v").and_then(|item| item.as_i64())
		}
	});
	assert_eq!(*value.get_once(), Some(1));

	right.set("v", 20).unwrap();
	assert_eq!(runs.get(), 1);

	flag.set("on", false).unwrap();
	assert_eq!(*value.get_once(), Some(20));
	assert_eq!(runs.get(), 2);

	left.set("v", 10).unwrap();
	assert_eq!(runs.get(), 2);
	assert_eq!(*value.get_once(), Some(20));
}

#[test]
fn optionally_computed_unwraps_constants() {
	let rt = Runtime::default();

	let plain = rt.optionally_computed(|_| 42i64);
	assert!(!plain.is_computed());
	assert_eq!(plain.get_once(), 42);

	let list = rt.list([1, 2]);
	let tracked = rt.optionally_computed({
		let list = list.clone();
		move |cx| list.len(cx)
	});
	assert!(tracked.is_computed());

	list.push(3).unwrap();
	assert_eq!(tracked.get_once(), 3);
}

#[test]
fn autorun_reruns_until_disposed() {
	let rt = Runtime::default();
	let record = rt.record([("x", 1)]);
	let seen = Recorder::new();

	let reaction = rt
		.autorun({
			let (record, seen) = (record.clone(), seen.clone());
			move |cx| {
				seen.push(record.get(cx, "x").and_then(|item| item.as_i64()));
				Ok(())
			}
		})
		.unwrap();
	assert_eq!(seen.take(), vec![Some(1)]);

	record.set("x", 2).unwrap();
	assert_eq!(seen.take(), vec![Some(2)]);

	reaction.dispose();
	assert!(reaction.is_disposed());
	record.set("x", 3).unwrap();
	assert_eq!(seen.len(), 0);
}

#[test]
fn dropping_the_reaction_stops_it() {
	let rt = Runtime::default();
	let list = rt.list([1]);
	let runs = counter();

	let reaction = autorun!(rt, (list, runs) cx => {
		runs.set(runs.get() + 1);
		list.len(cx);
		Ok(())
	})
	.unwrap();

	list.push(2).unwrap();
	assert_eq!(runs.get(), 2);

	drop(reaction);
	list.push(3).unwrap();
	assert_eq!(runs.get(), 2);
}

#[test]
fn reaction_errors_reach_the_writer() {
	let rt = Runtime::default();
	let record = rt.record([("x", 1)]);

	let _reaction = rt
		.autorun({
			let record = record.clone();
			move |cx| match record.get(cx, "x").and_then(|item| item.as_i64()) {
				Some(2) => Err(Error::DuplicateKey("x".into())),
				_ => Ok(()),
			}
		})
		.unwrap();

	assert_eq!(record.set("x", 2), Err(Error::DuplicateKey("x".into())));
	assert_eq!(record.get_once("x").and_then(|item| item.as_i64()), Some(2));

	record.set("x", 3).unwrap();
}

#[test]
fn autorun_tree_scopes_rerun_independently() {
	let rt = Runtime::default();
	let outer = rt.record([("a", 1)]);
	let inner = rt.record([("b", 1)]);
	let outer_runs = counter();
	let inner_runs = counter();

	let reaction = rt
		.autorun({
			let (outer, inner) = (outer.clone(), inner.clone());
			let (outer_runs, inner_runs) = (outer_runs.clone(), inner_runs.clone());
			move |cx| {
				outer_runs.set(outer_runs.get() + 1);
				outer.get(cx, "a");

				let (inner, inner_runs) = (inner.clone(), inner_runs.clone());
				cx.autorun_tree(move |cx| {
					inner_runs.set(inner_runs.get() + 1);
					inner.get(cx, "b");
					Ok(())
				})
			}
		})
		.unwrap();
	assert_eq!((outer_runs.get(), inner_runs.get()), (1, 1));

	inner.set("b", 2).unwrap();
	assert_eq!((outer_runs.get(), inner_runs.get()), (1, 2));

	outer.set("a", 2).unwrap();
	assert_eq!((outer_runs.get(), inner_runs.get()), (2, 3));

	inner.set("b", 3).unwrap();
	assert_eq!((outer_runs.get(), inner_runs.get()), (2, 4));

	reaction.dispose();
	inner.set("b", 4).unwrap();
	assert_eq!((outer_runs.get(), inner_runs.get()), (2, 4));
}

#[test]
fn vars_and_macros() {
	let rt = Runtime::default();
	let a = rt.var(10i64);
	let b = computed!(rt, (a) cx => *a.get(cx) + 10);
	assert_eq!(*b.get_once(), 20);

	let mock = SharedMock::new();
	mock.get().expect_trigger().times(1).return_const(());

	let _reaction = autorun!(rt, (a, b, mock) cx => {
		mock.get().trigger(*a.get(cx) + *b.get(cx));
		Ok(())
	})
	.unwrap();

	mock.get().checkpoint();

	mock.get()
		.expect_trigger()
		.with(predicate::eq(50))
		.times(1)
		.return_const(());

	rt.run_in_batch("set", || {
		a.set(20)?;
		a.set(20)?;
		a.set(20)
	})
	.unwrap();

	assert_eq!(*b.get_once(), 30);
	mock.get().checkpoint();
}

#[test]
fn var_map_and_toggle() {
	let rt = Runtime::default();
	let on = rt.var(false);
	let label = on.map(|on| if *on { "on" } else { "off" });
	assert_eq!(*label.get_once(), "off");

	on.toggle().unwrap();
	assert_eq!(*label.get_once(), "on");
	assert_eq!(on.replace(false).unwrap(), true);
	assert_eq!(label.state(), State::Valid);
	assert_eq!(*label.get_once(), "off");
}

#[test]
fn writes_to_own_dependency_are_bounded() {
	let rt = Runtime::new(Config::default().max_iterations(10));
	let count = rt.var(0i64);

	let result = rt.autorun({
		let count = count.clone();
		move |cx| {
			let value = *count.get(cx);
			count.set(value + 1)
		}
	});

	assert!(matches!(result, Err(Error::ReactionLoop(10))));
	assert!(*count.get_once() > 10);
}

#[test]
fn other_reactions_survive_a_reaction_loop() {
	let rt = Runtime::new(Config::default().max_iterations(5));
	let value = rt.var(0i64);

	let seen: Vec<Recorder<i64>> = (0..4).map(|_| Recorder::new()).collect();
	let _bystanders: Vec<_> = seen
		.iter()
		.map(|seen| {
			rt.autorun({
				let (value, seen) = (value.clone(), seen.clone());
				move |cx| {
					seen.push(*value.get(cx));
					Ok(())
				}
			})
			.unwrap()
		})
		.collect();

	let doubled = value.map(|v| v * 2);
	let _looping = rt
		.autorun({
			let value = value.clone();
			move |cx| {
				let current = *value.get(cx);
				if current > 0 {
					value.set(current + 1)?;
				}
				Ok(())
			}
		})
		.unwrap();

	assert_eq!(value.set(1), Err(Error::ReactionLoop(5)));

	value.set(-5).unwrap();
	for seen in &seen {
		assert_eq!(seen.last(), Some(-5));
	}
	assert_eq!(*doubled.get_once(), -10);

	value.set(-6).unwrap();
	for seen in &seen {
		assert_eq!(seen.last(), Some(-6));
	}
}

#[test]
fn snapshot_reads_track_nested_changes() {
	let rt = Runtime::default();
	let record = rt
		.make_listenable(Value::record([("tags", Value::list(["a"]))]))
		.unwrap();
	let snapshots = Recorder::new();

	let _reaction = rt
		.autorun({
			let (record, snapshots) = (record.clone(), snapshots.clone());
			move |cx| {
				snapshots.push(record.snapshot(cx));
				Ok(())
			}
		})
		.unwrap();

	let tags = record.get_once("tags").unwrap().as_listenable().unwrap().clone();
	tags.push("b").unwrap();

	assert_eq!(
		snapshots.last(),
		Some(Value::record([("tags", Value::list(["a", "b"]))]))
	);
	assert_eq!(snapshots.len(), 2);
}
