use listenable::{batch, Change, Config, Error, Item, Mutation, Result, Runtime, Value};

use crate::mock::{init_tracing, Recorder};

fn record_changes(listenable: &listenable::Listenable) -> (Recorder<Change>, listenable::Subscription) {
	let changes = Recorder::new();
	let subscription = listenable.listen().subscribe({
		let changes = changes.clone();
		move |change: &Change| changes.push(change.clone())
	});
	(changes, subscription)
}

fn ints(values: &[i64]) -> Vec<Item> {
	values.iter().map(|v| Item::from(*v)).collect()
}

#[test]
fn contiguous_appends_merge_into_one_mutation() {
	init_tracing();

	let rt = Runtime::default();
	let list = rt.list(Vec::<i64>::new());
	let (changes, _subscription) = record_changes(&list);

	rt.run_in_batch("fill", || -> Result<()> {
		for i in 1..=3 {
			list.push(i as i64)?;
		}
		Ok(())
	})
	.unwrap();

	let changes = changes.take();
	assert_eq!(changes.len(), 1);
	assert_eq!(
		changes[0].mutation,
		Mutation::Splice {
			index: 0,
			removed: vec![],
			inserted: ints(&[1, 2, 3]),
		}
	);
	assert_eq!(changes[0].batch.as_deref(), Some("fill"));
}

#[test]
fn nested_batches_deliver_once() {
	let rt = Runtime::default();
	let list = rt.list([0]);
	let (changes, _subscription) = record_changes(&list);

	rt.run_in_batch("outer", || -> Result<()> {
		list.push(1)?;
		rt.run_in_batch("inner", || list.push(2))?;
		assert!(rt.in_batch());
		assert_eq!(changes.len(), 0);
		Ok(())
	})
	.unwrap();

	assert!(!rt.in_batch());
	let changes = changes.take();
	assert_eq!(changes.len(), 1);
	assert_eq!(changes[0].batch.as_deref(), Some("outer"));
}

#[test]
fn writes_that_cancel_out_are_dropped() {
	let rt = Runtime::default();
	let record = rt.record([("a", 1)]);
	let (changes, _subscription) = record_changes(&record);

	rt.run_in_batch("noop", || -> Result<()> {
		record.set("a", 2)?;
		record.set("a", 1)?;
		record.set("tmp", true)?;
		record.remove("tmp")?;
		Ok(())
	})
	.unwrap();

	assert_eq!(changes.len(), 0);
}

#[test]
fn failing_batch_keeps_and_delivers_its_writes() {
	let rt = Runtime::default();
	let list = rt.list(Vec::<i64>::new());
	let (changes, _subscription) = record_changes(&list);

	let result: Result<()> = rt.run_in_batch("partial", || {
		list.push(1)?;
		Err(Error::DuplicateKey("x".into()))
	});

	assert_eq!(result, Err(Error::DuplicateKey("x".into())));
	assert_eq!(list.len_once(), 1);
	assert_eq!(changes.len(), 1);
}

#[test]
fn failing_transaction_restores_everything() {
	let rt = Runtime::default();
	let record = rt.record([("a", 1)]);
	let list = rt.list([1, 2, 3]);
	let (record_changes_seen, _s1) = record_changes(&record);
	let (list_changes_seen, _s2) = record_changes(&list);

	let record_before = record.snapshot_once();
	let list_before = list.snapshot_once();

	let result: Result<()> = rt.run_transaction("tx", || {
		record.set("a", 2)?;
		record.set("b", 3)?;
		record.remove("a")?;
		list.push(4)?;
		list.splice(0, 2, [9])?;
		list.set(0, 7)?;
		Err(Error::DuplicateKey("abort".into()))
	});

	assert_eq!(result, Err(Error::DuplicateKey("abort".into())));
	assert_eq!(record.snapshot_once(), record_before);
	assert_eq!(list.snapshot_once(), list_before);
	assert_eq!(record_changes_seen.len(), 0);
	assert_eq!(list_changes_seen.len(), 0);
}

#[test]
fn rollback_restores_nested_values() {
	let rt = Runtime::default();
	let record = rt
		.make_listenable(Value::record([("tags", Value::list(["a"]))]))
		.unwrap();
	let tags = record.get_once("tags").unwrap().as_listenable().unwrap().clone();
	let before = record.snapshot_once();

	let result: Result<()> = rt.run_transaction("tx", || {
		tags.push("b")?;
		record.set("tags", Value::list(["c"]))?;
		Err(Error::ReadOnlyViolation)
	});
	assert!(result.is_err());
	assert_eq!(record.snapshot_once(), before);

	let (changes, _subscription) = record_changes(&record);
	tags.push("d").unwrap();
	assert_eq!(changes.len(), 1);
}

#[test]
fn rollback_restores_vars_and_their_dependents() {
	let rt = Runtime::default();
	let value = rt.var(1i64);
	let tenfold = value.map(|v| v * 10);

	let result: Result<()> = rt.run_transaction("tx", || {
		value.set(2)?;
		assert_eq!(*tenfold.get_once(), 20);
		Err(Error::ReadOnlyViolation)
	});

	assert!(result.is_err());
	assert_eq!(*value.get_once(), 1);
	assert_eq!(*tenfold.get_once(), 10);
}

#[test]
fn inner_transaction_only_undoes_its_own_writes() {
	let rt = Runtime::default();
	let list = rt.list(Vec::<i64>::new());
	let (changes, _subscription) = record_changes(&list);

	rt.run_in_batch("outer", || -> Result<()> {
		list.push(1)?;
		let inner: Result<()> = rt.run_transaction("inner", || {
			list.push(2)?;
			Err(Error::ReadOnlyViolation)
		});
		assert!(inner.is_err());
		list.push(3)?;
		Ok(())
	})
	.unwrap();

	assert_eq!(list.snapshot_once(), Value::list([1, 3]));
	let changes = changes.take();
	assert_eq!(changes.len(), 1);
	assert_eq!(
		changes[0].mutation,
		Mutation::Splice {
			index: 0,
			removed: vec![],
			inserted: ints(&[1, 3]),
		}
	);
}

#[test]
fn strict_mode_requires_a_batch() {
	let rt = Runtime::new(Config::default().strict(true));
	let list = rt.list([1]);
	let count = rt.var(0i64);

	assert_eq!(list.push(2), Err(Error::StrictModeViolation));
	assert_eq!(count.set(1), Err(Error::StrictModeViolation));
	assert_eq!(list.len_once(), 1);
	assert_eq!(*count.get_once(), 0);

	rt.run_in_batch("ok", || list.push(2)).unwrap();
	assert_eq!(list.len_once(), 2);

	let mirror = rt.record([("len", 0)]);
	let _reaction = rt
		.autorun({
			let (list, mirror) = (list.clone(), mirror.clone());
			move |cx| mirror.set("len", list.len(cx) as i64)
		})
		.unwrap();
	batch!(rt, "grow", (list) => list.push(3)).unwrap();
	assert_eq!(mirror.get_once("len").and_then(|i| i.as_i64()), Some(3));

	rt.set_strict(false);
	list.push(4).unwrap();
	assert_eq!(mirror.get_once("len").and_then(|i| i.as_i64()), Some(4));
}

#[test]
fn wrapped_callables_run_in_their_own_scope() {
	let rt = Runtime::default();
	let list = rt.list(Vec::<i64>::new());
	let (changes, _subscription) = record_changes(&list);

	let push_twice = rt.batched("push_twice", {
		let list = list.clone();
		move |n: i64| -> Result<()> {
			list.push(n)?;
			list.push(n)
		}
	});
	push_twice(5).unwrap();
	assert_eq!(changes.take().len(), 1);

	let failing = rt.transactional("failing", {
		let list = list.clone();
		move |n: i64| -> Result<()> {
			list.push(n)?;
			Err(Error::ReadOnlyViolation)
		}
	});
	assert!(failing(1).is_err());
	assert_eq!(list.snapshot_once(), Value::list([5, 5]));
	assert_eq!(changes.len(), 0);
}

#[test]
fn batches_are_delivered_in_commit_order() {
	let rt = Runtime::default();
	let list = rt.list(Vec::<i64>::new());
	let copy = rt.list(Vec::<i64>::new());
	let (changes, _subscription) = record_changes(&copy);

	let _mirror = list.listen().try_subscribe({
		let copy = copy.clone();
		move |change: &Change| match &change.mutation {
			Mutation::Splice {
				index,
				removed,
				inserted,
			} => copy.splice(*index, removed.len(), inserted.clone()).map(drop),
			_ => Ok(()),
		}
	});

	rt.run_in_batch("first", || list.push(1)).unwrap();
	rt.run_in_batch("second", || list.push(2)).unwrap();

	assert_eq!(copy.snapshot_once(), Value::list([1, 2]));
	let names: Vec<_> = changes
		.take()
		.into_iter()
		.map(|change| change.batch.as_deref().map(str::to_owned))
		.collect();
	assert_eq!(names, vec![None, None]);
}
