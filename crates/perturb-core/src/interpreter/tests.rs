use super::*;
use crate::parser::parse_program;

fn run(source: &str) -> String {
    let module = parse_program(source).expect("source should parse");
    let mut interp = Interpreter::default();
    if let Err(err) = interp.exec_module(&module) {
        panic!("program raised {}: {}", err.kind.name(), err.message);
    }
    interp.take_output()
}

fn run_err(source: &str) -> PyException {
    let module = parse_program(source).expect("source should parse");
    let mut interp = Interpreter::default();
    interp
        .exec_module(&module)
        .expect_err("program should raise")
}

#[test]
fn test_print_and_arithmetic() {
    let out = run("print(1 + 2, 7 // 2, -7 // 2, 7 % -3, 2 ** 10, 1 / 4)\n");
    assert_eq!(out, "3 3 -4 -2 1024 0.25\n");
}

#[test]
fn test_print_sep_and_end() {
    let out = run("print('a', 'b', sep='-', end='!')\nprint()\n");
    assert_eq!(out, "a-b!\n");
}

#[test]
fn test_containers_repr() {
    let out = run("print([1, 'a', (2,), {'k': None}, True, 1.5])\n");
    assert_eq!(out, "[1, 'a', (2,), {'k': None}, True, 1.5]\n");
}

#[test]
fn test_functions_and_defaults() {
    let source = "\
def add(a, b=10, *rest, scale=1):
    return (a + b + sum(rest)) * scale

print(add(1))
print(add(1, 2, 3, 4))
print(add(1, scale=3))
";
    assert_eq!(run(source), "11\n10\n33\n");
}

#[test]
fn test_closures_and_nonlocal() {
    let source = "\
def counter():
    count = 0
    def bump():
        nonlocal count
        count += 1
        return count
    return bump

c = counter()
c()
c()
print(c())
";
    assert_eq!(run(source), "3\n");
}

#[test]
fn test_global_statement() {
    let source = "\
total = 0
def add(n):
    global total
    total += n
add(4)
add(5)
print(total)
";
    assert_eq!(run(source), "9\n");
}

#[test]
fn test_unbound_local() {
    let err = run_err("x = 1\ndef f():\n    print(x)\n    x = 2\nf()\n");
    assert_eq!(err.kind, ExceptionKind::UnboundLocalError);
}

#[test]
fn test_try_except_finally() {
    let source = "\
def f(xs):
    try:
        return xs[5]
    except IndexError as e:
        print('caught', e)
        return -1
    finally:
        print('done')

print(f([1, 2]))
";
    assert_eq!(run(source), "caught list index out of range\ndone\n-1\n");
}

#[test]
fn test_exception_hierarchy_and_raise() {
    let source = "\
try:
    raise ValueError('bad', 2)
except Exception as e:
    print(type(e).__name__, e.args)
try:
    {}['missing']
except LookupError as e:
    print(repr(str(e)))
";
    assert_eq!(run(source), "ValueError ('bad', 2)\n\"'missing'\"\n");
}

#[test]
fn test_uncaught_zero_division() {
    let err = run_err("print(1 / 0)\n");
    assert_eq!(err.kind, ExceptionKind::ZeroDivisionError);
    assert_eq!(err.message, "division by zero");
}

#[test]
fn test_slicing_and_negative_indices() {
    let source = "\
s = 'abcdef'
xs = [0, 1, 2, 3, 4, 5]
print(s[1:4], s[::-1], s[-2:], xs[::2], xs[-1])
xs[1:3] = ['x']
print(xs)
";
    assert_eq!(run(source), "bcd fedcba ef [0, 2, 4] 5\n[0, 'x', 3, 4, 5]\n");
}

#[test]
fn test_unpacking() {
    let source = "\
a, (b, c) = 1, (2, 3)
first, *middle, last = range(5)
print(a, b, c, first, middle, last)
a, b = b, a
print(a, b)
";
    assert_eq!(run(source), "1 2 3 0 [1, 2, 3] 4\n2 1\n");
}

#[test]
fn test_unpack_mismatch() {
    let err = run_err("a, b = [1, 2, 3]\n");
    assert_eq!(err.kind, ExceptionKind::ValueError);
    assert_eq!(err.message, "too many values to unpack (expected 2)");
}

#[test]
fn test_comprehensions() {
    let source = "\
print([x * x for x in range(5) if x % 2 == 0])
print({k: len(k) for k in ['a', 'bb']})
print(sorted({c for c in 'hello'}))
print(sum(x for x in range(4)))
print([(i, j) for i in range(2) for j in range(i)])
";
    assert_eq!(
        run(source),
        "[0, 4, 16]\n{'a': 1, 'bb': 2}\n['e', 'h', 'l', 'o']\n6\n[(1, 0)]\n"
    );
}

#[test]
fn test_loops_with_else_break_continue() {
    let source = "\
for i in range(10):
    if i == 1:
        continue
    if i == 3:
        break
    print(i)
else:
    print('no break')
n = 0
while n < 2:
    n += 1
else:
    print('while done', n)
";
    assert_eq!(run(source), "0\n2\nwhile done 2\n");
}

#[test]
fn test_builtins() {
    let source = "\
print(len('abc'), abs(-3), max([3, 9, 2]), min(4, 1), sum([1, 2], 10))
print(sorted([3, 1, 2], reverse=True), list(reversed([1, 2])))
print(list(enumerate('ab')), list(zip([1, 2], 'xy')))
print(list(map(str, [1, 2])), list(filter(None, [0, 1, 2])))
print(round(2.5), round(3.5), round(1.234, 2), divmod(7, -2))
print(int('42'), float('1.5'), str(3), bool([]), chr(97), ord('a'))
print(all([]), any([0, 0]), isinstance(True, int), isinstance('a', (list, str)))
";
    assert_eq!(
        run(source),
        "\
3 3 9 1 13
[3, 2, 1] [2, 1]
[(0, 'a'), (1, 'b')] [(1, 'x'), (2, 'y')]
['1', '2'] [1, 2]
2 4 1.23 (-4, -1)
42 1.5 3 False a 97
True False True True
"
    );
}

#[test]
fn test_string_methods() {
    let source = "\
s = '  Hello World  '
print(s.strip().lower(), s.split(), 'a,b,,c'.split(','))
print('-'.join(['x', 'y']), 'abc'.upper(), 'hello'.find('l'), 'hello'.rfind('l'))
print('abc'.startswith(('x', 'a')), 'abc'.endswith('c'), 'aaa'.count('a'))
print('hello world'.title(), 'Hi'.swapcase(), 'ab'.center(6, '*'), '7'.zfill(3))
print('{} and {name}'.format(1, name='two'), '%d-%s' % (3, 'x'))
";
    assert_eq!(
        run(source),
        "\
hello world ['Hello', 'World'] ['a', 'b', '', 'c']
x-y ABC 2 3
True True 3
Hello World hI **ab** 007
1 and two 3-x
"
    );
}

#[test]
fn test_list_and_dict_methods() {
    let source = "\
xs = [3, 1, 2]
xs.append(4)
xs.sort(key=lambda v: -v)
print(xs, xs.pop(), xs.pop(0), xs.index(2))
d = {'a': 1}
d.setdefault('b', 2)
d.update({'c': 3})
print(d.get('z', 0), d.pop('a'), sorted(d.items()), list(d.keys()))
s = {1, 2}
s.add(3)
print(sorted(s.union({9})), s.issubset({1, 2, 3, 4}))
";
    assert_eq!(
        run(source),
        "[4, 3, 2, 1] 1 4 0\n0 1 [('b', 2), ('c', 3)] ['b', 'c']\n[1, 2, 3, 9] True\n"
    );
}

#[test]
fn test_method_errors() {
    let err = run_err("[].pop()\n");
    assert_eq!(err.kind, ExceptionKind::IndexError);
    assert_eq!(err.message, "pop from empty list");

    let err = run_err("[1].index(5)\n");
    assert_eq!(err.message, "5 is not in list");

    let err = run_err("(1).foo\n");
    assert_eq!(err.kind, ExceptionKind::AttributeError);
    assert_eq!(err.message, "'int' object has no attribute 'foo'");
}

#[test]
fn test_recursion_limit() {
    let module = parse_program("def f(n):\n    return f(n + 1)\nf(0)\n").unwrap();
    let mut interp = Interpreter::new(50);
    let err = interp.exec_module(&module).unwrap_err();
    assert_eq!(err.kind, ExceptionKind::RecursionError);

    let config = crate::PerturbConfig {
        recursion_limit: 30,
        ..Default::default()
    };
    let err = Interpreter::from_config(&config)
        .exec_module(&module)
        .unwrap_err();
    assert_eq!(err.message, "maximum recursion depth exceeded");
}

#[test]
fn test_recursion_within_limit() {
    let source = "\
def fib(n):
    return n if n < 2 else fib(n - 1) + fib(n - 2)
print(fib(15))
";
    assert_eq!(run(source), "610\n");
}

#[test]
fn test_builtin_override_with_lambda() {
    let source = "\
old_range = range
range = lambda *args: old_range(1, args[0]) if len(args) == 1 else old_range(*args)
old_enumerate = enumerate
enumerate = lambda x: old_enumerate(x, start=1)
print(list(range(4)), list(range(0, 2)), list(enumerate('ab')))
";
    assert_eq!(run(source), "[1, 2, 3] [0, 1] [(1, 'a'), (2, 'b')]\n");
}

#[test]
fn test_imports() {
    let source = "\
import math
from typing import List
from functools import reduce
print(math.sqrt(16), math.floor(2.7), reduce(lambda a, b: a * b, [1, 2, 3, 4]))
";
    assert_eq!(run(source), "4.0 2 24\n");

    let err = run_err("import numpy\n");
    assert_eq!(err.kind, ExceptionKind::ModuleNotFoundError);
}

#[test]
fn test_assert_statement() {
    run("assert 1 + 1 == 2\n");
    let err = run_err("assert [] , 'empty'\n");
    assert_eq!(err.kind, ExceptionKind::AssertionError);
    assert_eq!(err.message, "empty");
}

#[test]
fn test_calling_errors() {
    let err = run_err("def f(a):\n    return a\nf(1, 2)\n");
    assert_eq!(err.kind, ExceptionKind::TypeError);
    assert_eq!(err.message, "f() takes 1 positional argument but 2 were given");

    let err = run_err("5()\n");
    assert_eq!(err.message, "'int' object is not callable");
}

#[test]
fn test_sets_iterate_in_table_order() {
    let source = "\
print({3, 1, 2})
print(list({9, 8, 1}))
print(set([10, 5, 100, 33]))
print({'apple', 'banana', 'cherry'})
print({145, 195, 16, 65, 30}, set([145, 195, 16, 65, 30]))
";
    assert_eq!(
        run(source),
        "{1, 2, 3}\n[8, 9, 1]\n{33, 10, 100, 5}\n{'banana', 'cherry', 'apple'}\n\
         {16, 65, 145, 195, 30} {65, 195, 16, 145, 30}\n"
    );
}

#[test]
fn test_set_operators_and_updates() {
    let source = "\
a = {1, 2, 3, 17}
b = {17, 40, 2}
print(a | b, a & b, a - b, a ^ b)
a -= {1}
a |= {33}
print(a)
alias = a
alias &= {2, 33, 99}
print(a, a.pop(), a)
s = {5, 13, 21}
s.discard(13)
s.add(29)
print(s, s.symmetric_difference([5, 6]), s.intersection(s))
";
    assert_eq!(
        run(source),
        "{1, 2, 3, 17, 40} {17, 2} {1, 3} {1, 3, 40}\n\
         {17, 2, 3, 33}\n\
         {2} 33 {2}\n\
         {21, 5, 29} {21, 29, 6} {21, 5, 29}\n"
    );

    let err = run_err("set().pop()\n");
    assert_eq!(err.kind, ExceptionKind::KeyError);
}

#[test]
fn test_dict_views() {
    let source = "\
d = {'a': 1, 'b': 2}
k = d.keys()
v = d.values()
print([k, v, d.items()])
d['c'] = 3
print(len(k), list(v), ('c', 3) in d.items(), 'c' in k)
print(k == {'a', 'b', 'c'}, k == ['a', 'b', 'c'], v == v, d.values() == d.values())
print(k & {'b', 'z'}, k - {'a'}, d.items() <= {('a', 1), ('b', 2), ('c', 3), 4})
print(sorted(d.items(), key=lambda pair: -pair[1]), list(reversed(k)))
";
    assert_eq!(
        run(source),
        "[dict_keys(['a', 'b']), dict_values([1, 2]), dict_items([('a', 1), ('b', 2)])]\n\
         3 [1, 2, 3] True True\n\
         True False True False\n\
         {'b'} {'c', 'b'} True\n\
         [('c', 3), ('b', 2), ('a', 1)] ['c', 'b', 'a']\n"
    );
}

#[test]
fn test_main_guard_does_not_run() {
    let source = "\
if __name__ == \"__main__\":
    print(['main'])
print([__name__])
";
    assert_eq!(run(source), "['solution']\n");
}

#[test]
fn test_big_ints() {
    let source = "\
print(2 ** 64, -2 ** 63 - 1, 10 ** 20 // 7, (2 ** 64) % 1000)
x = 9223372036854775807
x += 1
print(x, type(x).__name__, x - 1 == 9223372036854775807)
print(2 ** 64 > 1.5e19, 2 ** 53 + 1 == 2.0 ** 53, hex(2 ** 70), int('123456789012345678901234567890') + 1)
import math
print(math.factorial(25), abs(-2 ** 100), pow(3, 200, 10 ** 9 + 7), pow(3, -1, 7))
print(hash(2 ** 64), {2 ** 64: 'big'}[18446744073709551616], round(2 ** 70, -20))
";
    assert_eq!(
        run(source),
        "18446744073709551616 -9223372036854775809 14285714285714285714 616\n\
         9223372036854775808 int True\n\
         True False 0x400000000000000000 123456789012345678901234567891\n\
         15511210043330985984000000 1267650600228229401496703205376 136318165 5\n\
         8 big 1200000000000000000000\n"
    );
}
